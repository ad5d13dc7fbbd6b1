//! Hardware backends for the carousel dispenser.
//!
//! The simulator is always available; Raspberry Pi GPIO backends are behind
//! the `hardware` feature.
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{BlinkTiming, GpioRig, RigPins};
pub use sim::{SimButtons, SimCarousel, SimCarouselCfg, SimCoils, SimIndicator, SimSnapshot};
