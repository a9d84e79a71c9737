use anyhow::Result;
use once_cell::sync::OnceCell;
use std::collections::HashMap;

/// Mapping from platform name to serial baud rate.
#[derive(Debug, Default)]
pub struct PlatformTable {
    rates: HashMap<String, i32>,
}

impl PlatformTable {
    /// Insert or overwrite the rate for `name`.
    pub fn register(&mut self, name: &str, baud_rate: i32) {
        self.rates.insert(name.to_string(), baud_rate);
    }

    /// Rate for `name`, or -1 if the platform was never registered.
    pub fn baud_rate(&self, name: &str) -> i32 {
        self.rates.get(name).copied().unwrap_or(-1)
    }
}

type BulkInit = fn(&mut PlatformTable) -> Result<()>;

/// Lazily built platform table. The bulk initializer runs on the first
/// lookup and never again; if it errors, the error is logged and whatever it
/// managed to register stays in effect.
#[derive(Debug)]
pub struct BaudRegistry {
    table: OnceCell<PlatformTable>,
    init: BulkInit,
}

impl BaudRegistry {
    pub const fn new(init: BulkInit) -> Self {
        Self {
            table: OnceCell::new(),
            init,
        }
    }

    pub fn lookup(&self, name: &str) -> i32 {
        self.table
            .get_or_init(|| {
                let mut table = PlatformTable::default();
                if let Err(e) = (self.init)(&mut table) {
                    log::warn!(
                        "failed to initialize platform baud rates: {e:#}; \
                         serial communication may not work properly"
                    );
                }
                table
            })
            .baud_rate(name)
    }
}

/// Baud rates for the platforms the mote toolchain ships.
pub static BAUD_RATES: BaudRegistry = BaudRegistry::new(standard_platforms);

/// Lookup against [`BAUD_RATES`].
pub fn baud_rate(name: &str) -> i32 {
    BAUD_RATES.lookup(name)
}

fn standard_platforms(table: &mut PlatformTable) -> Result<()> {
    for (name, baud) in [
        ("avrmote", 57600),
        ("epic", 115200),
        ("eyesifx", 115200),
        ("intelmote2", 115200),
        ("iris", 57600),
        ("mica", 19200),
        ("mica2", 57600),
        ("mica2dot", 19200),
        ("micaz", 57600),
        ("mulle", 115200),
        ("shimmer", 115200),
        ("telos", 115200),
        ("telosb", 115200),
        ("tinynode", 115200),
        ("tmote", 115200),
        ("ucmini", 115200),
        ("zigbit", 38400),
    ] {
        table.register(name, baud);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unknown_platform_is_sentinel() {
        let table = PlatformTable::default();
        assert_eq!(table.baud_rate("notamote"), -1);
    }

    #[test]
    fn latest_registration_wins() {
        let mut table = PlatformTable::default();
        table.register("telosb", 115200);
        assert_eq!(table.baud_rate("telosb"), 115200);
        table.register("telosb", 57600);
        assert_eq!(table.baud_rate("telosb"), 57600);
    }

    #[test]
    fn bulk_initializer_runs_exactly_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn counting(table: &mut PlatformTable) -> Result<()> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            table.register("telosb", 115200);
            Ok(())
        }
        let registry = BaudRegistry::new(counting);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(registry.lookup("telosb"), 115200);
        assert_eq!(registry.lookup("missing"), -1);
        assert_eq!(registry.lookup("telosb"), 115200);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_initializer_keeps_partial_state_and_is_not_retried() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn failing(table: &mut PlatformTable) -> Result<()> {
            CALLS.fetch_add(1, Ordering::SeqCst);
            table.register("mica2", 57600);
            anyhow::bail!("rate table unavailable")
        }
        let registry = BaudRegistry::new(failing);
        assert_eq!(registry.lookup("anything"), -1);
        assert_eq!(registry.lookup("mica2"), 57600);
        assert_eq!(registry.lookup("anything"), -1);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ships_the_common_platforms() {
        assert_eq!(baud_rate("telosb"), 115200);
        assert_eq!(baud_rate("micaz"), 57600);
        assert_eq!(baud_rate("mica2dot"), 19200);
        assert_eq!(baud_rate("not-a-mote"), -1);
    }
}
