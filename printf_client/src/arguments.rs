#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageError;

/// Pick the packet source out of the raw argument list.
///
/// Only a list of exactly two entries is inspected: `-comm SOURCE` names a
/// source, two entries led by anything else are a usage error. Every other
/// shape, including a lone `-comm`, leaves the default source in effect.
pub fn comm_source(args: &[String]) -> Result<Option<String>, UsageError> {
    if args.len() == 2 {
        if args[0] != "-comm" {
            return Err(UsageError);
        }
        return Ok(Some(args[1].clone()));
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn no_arguments_selects_default() {
        assert_eq!(comm_source(&args(&[])), Ok(None));
    }

    #[test]
    fn comm_pair_selects_source() {
        assert_eq!(
            comm_source(&args(&["-comm", "sf@localhost:9002"])),
            Ok(Some("sf@localhost:9002".to_string()))
        );
    }

    #[test]
    fn lone_comm_falls_through_to_default() {
        assert_eq!(comm_source(&args(&["-comm"])), Ok(None));
    }

    #[test]
    fn two_arguments_without_comm_are_an_error() {
        assert_eq!(
            comm_source(&args(&["--comm", "sf@localhost:9002"])),
            Err(UsageError)
        );
    }

    #[test]
    fn extra_arguments_fall_through_to_default() {
        assert_eq!(
            comm_source(&args(&["-comm", "sf@localhost:9002", "extra"])),
            Ok(None)
        );
    }
}
