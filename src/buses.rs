//! Bus backend registration and dispatch
//!
//! Backends are selected with a spec string `name[:key=value,...]`, the
//! same shape as programmer strings in other flashing tools. Each backend
//! is gated behind a cargo feature.

use std::collections::HashMap;
use std::sync::Arc;

use denis_core::bus::BusHandle;

use crate::board::{BoardError, BusFactory};

/// Information about a bus backend
pub struct BusInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_buses() -> Vec<BusInfo> {
    let mut buses = Vec::new();

    #[cfg(feature = "dummy")]
    buses.push(BusInfo {
        name: "dummy",
        aliases: &[],
        description: "In-memory recording bus (maxspeed=<kHz>,delay=<us>)",
    });

    #[cfg(feature = "linux-spi")]
    buses.push(BusInfo {
        name: "linux_spi",
        aliases: &["linux-spi", "spidev"],
        description: "Linux spidev, bus N maps to /dev/spidevN.* (spispeed=<kHz>,dir=<path>)",
    });

    buses
}

/// Short list of backend names for CLI help
pub fn bus_names_short() -> String {
    let buses = available_buses();
    let names: Vec<&str> = buses.iter().map(|b| b.name).collect();
    names.join(", ")
}

/// Parsed bus spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusSpec {
    /// Backend name as given
    pub name: String,
    /// Key-value parameters, in order
    pub params: Vec<(String, String)>,
}

impl BusSpec {
    /// Parameters as borrowed pairs
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a bus spec string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_bus_spec(s: &str) -> Result<BusSpec, BoardError> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err(BoardError::BusSpec(format!("missing backend name in '{}'", s)));
    }

    let mut params = Vec::new();
    if !opts_str.is_empty() {
        for opt in opts_str.split(',') {
            match opt.split_once('=') {
                Some((key, value)) => params.push((key.to_string(), value.to_string())),
                None => {
                    return Err(BoardError::BusSpec(format!(
                        "invalid parameter '{}' (expected key=value)",
                        opt
                    )))
                }
            }
        }
    }

    Ok(BusSpec {
        name: name.to_string(),
        params,
    })
}

/// Build the bus factory named by `spec`
pub fn open_factory(spec: &str) -> Result<Box<dyn BusFactory>, BoardError> {
    let spec = parse_bus_spec(spec)?;

    match spec.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" => Ok(Box::new(DummyBuses::from_spec(&spec)?)),

        #[cfg(feature = "linux-spi")]
        "linux_spi" | "linux-spi" | "spidev" => Ok(Box::new(LinuxSpiBuses::new(spec))),

        _ => Err(BoardError::UnknownBus(format!(
            "{} [available: {}]",
            spec.name,
            bus_names_short()
        ))),
    }
}

/// Dummy buses, one recording bus per bus number
#[cfg(feature = "dummy")]
#[derive(Default)]
pub struct DummyBuses {
    config: denis_dummy::DummyConfig,
    opened: HashMap<u32, Arc<denis_dummy::RecordingBus>>,
}

#[cfg(feature = "dummy")]
impl DummyBuses {
    fn from_spec(spec: &BusSpec) -> Result<Self, BoardError> {
        let mut config = denis_dummy::DummyConfig::default();

        for (key, value) in &spec.params {
            match key.as_str() {
                "maxspeed" => {
                    let khz: u32 = value
                        .parse()
                        .map_err(|_| BoardError::BusSpec(format!("invalid maxspeed: {}", value)))?;
                    config.max_frequency = khz.saturating_mul(1000);
                }
                "delay" => {
                    let us: u64 = value
                        .parse()
                        .map_err(|_| BoardError::BusSpec(format!("invalid delay: {}", value)))?;
                    config.transfer_delay = std::time::Duration::from_micros(us);
                }
                _ => log::warn!("dummy: Unknown option: {}={}", key, value),
            }
        }

        Ok(Self {
            config,
            opened: HashMap::new(),
        })
    }

    /// The recording bus behind `busno`, if it was opened
    #[cfg(test)]
    pub fn bus(&self, busno: u32) -> Option<&Arc<denis_dummy::RecordingBus>> {
        self.opened.get(&busno)
    }
}

#[cfg(feature = "dummy")]
impl BusFactory for DummyBuses {
    fn open_bus(&mut self, busno: u32) -> Result<BusHandle, BoardError> {
        let config = &self.config;
        let bus = self.opened.entry(busno).or_insert_with(|| {
            log::debug!("dummy: Creating bus {}", busno);
            Arc::new(denis_dummy::RecordingBus::new(config.clone()))
        });
        Ok(bus.clone())
    }
}

/// spidev controllers, opened on first use
///
/// Handles are cached per controller, not per board bus number: an explicit
/// `bus=` in the spec maps every board bus onto one controller, and all of
/// them must share one handle so the bus lock and the chip select check
/// cover the whole controller.
#[cfg(feature = "linux-spi")]
pub struct LinuxSpiBuses {
    spec: BusSpec,
    opened: HashMap<u32, BusHandle>,
}

#[cfg(feature = "linux-spi")]
impl LinuxSpiBuses {
    fn new(spec: BusSpec) -> Self {
        Self {
            spec,
            opened: HashMap::new(),
        }
    }
}

#[cfg(feature = "linux-spi")]
impl BusFactory for LinuxSpiBuses {
    fn open_bus(&mut self, busno: u32) -> Result<BusHandle, BoardError> {
        let busno_str = busno.to_string();
        let mut options = vec![("bus", busno_str.as_str())];
        // An explicit bus= in the spec pins every board bus to that controller
        options.extend(self.spec.options());

        let controller = denis_linux_spi::parse_options(&options)
            .map_err(BoardError::BusSpec)?
            .bus;
        if controller != busno {
            log::debug!("linux_spi: Board bus {} maps to controller {}", busno, controller);
        }
        if let Some(bus) = self.opened.get(&controller) {
            return Ok(bus.clone());
        }

        let bus: BusHandle =
            Arc::new(denis_linux_spi::open_linux_spi(&options).map_err(|e| {
                BoardError::BusUnavailable {
                    busno,
                    reason: e.to_string(),
                }
            })?);
        self.opened.insert(controller, bus.clone());
        Ok(bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bus_spec() {
        let spec = parse_bus_spec("linux_spi:bus=1,spispeed=1000").unwrap();
        assert_eq!(spec.name, "linux_spi");
        assert_eq!(spec.options(), vec![("bus", "1"), ("spispeed", "1000")]);

        let spec = parse_bus_spec("dummy").unwrap();
        assert_eq!(spec.name, "dummy");
        assert!(spec.params.is_empty());
    }

    #[test]
    fn test_parse_bus_spec_errors() {
        assert!(matches!(parse_bus_spec(""), Err(BoardError::BusSpec(_))));
        assert!(matches!(
            parse_bus_spec("dummy:fast"),
            Err(BoardError::BusSpec(_))
        ));
    }

    #[test]
    fn test_unknown_backend() {
        assert!(matches!(
            open_factory("ch341a"),
            Err(BoardError::UnknownBus(_))
        ));
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_factory_reuses_buses() {
        let mut factory = DummyBuses::from_spec(&parse_bus_spec("dummy:maxspeed=1000").unwrap())
            .unwrap();
        let a = factory.open_bus(1).unwrap();
        let b = factory.open_bus(1).unwrap();
        let c = factory.open_bus(2).unwrap();

        assert!(denis_core::bus::same_bus(&a, &b));
        assert!(!denis_core::bus::same_bus(&a, &c));
        assert_eq!(factory.bus(1).unwrap().config().max_frequency, 1_000_000);
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_factory_rejects_bad_option() {
        assert!(open_factory("dummy:delay=soon").is_err());
    }

    #[cfg(feature = "linux-spi")]
    #[test]
    fn test_linux_spi_pinned_controller_shares_one_handle() {
        use crate::board::{bring_up, BoardConfig};
        use denis_core::error::errno;
        use denis_core::{DevFs, Registry};

        let dir = std::env::temp_dir().join(format!("denis-buses-pin-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("spidev0.0"), b"").unwrap();

        let spec = format!("linux_spi:bus=0,dir={}", dir.display());
        let mut factory = open_factory(&spec).unwrap();
        let a = factory.open_bus(1).unwrap();
        let b = factory.open_bus(2).unwrap();
        assert!(denis_core::bus::same_bus(&a, &b));

        let board = BoardConfig::from_toml_str(
            r#"
            [[device]]
            path = "/dev/denis0"
            devid = 0
            busno = 1

            [[device]]
            path = "/dev/denis1"
            devid = 0
            busno = 2
            "#,
        )
        .unwrap();

        let mut fs = DevFs::new();
        let mut registry = Registry::new();
        let err = bring_up(&board, &mut fs, &mut registry, factory.as_mut()).unwrap_err();
        assert!(matches!(
            err,
            BoardError::Register {
                source: denis_core::Error::ChipSelectInUse,
                ..
            }
        ));
        assert_eq!(err.errno(), errno::EBUSY);
        assert_eq!(registry.len(), 1);
        assert!(!fs.contains("/dev/denis1"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(feature = "linux-spi")]
    #[test]
    fn test_linux_spi_rejects_bad_bus_option() {
        let mut factory = open_factory("linux_spi:bus=first").unwrap();
        assert!(matches!(factory.open_bus(1), Err(BoardError::BusSpec(_))));
    }
}
