//! Logging shims.
//!
//! Every component logs through these macros. They forward to `log`, `defmt`
//! or `esp-println` depending on which cargo feature is enabled, and compile
//! to nothing otherwise.

#![allow(unused_macros)]

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::info!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::info!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! error {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::error!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::error!($s $(, $x)*);
            #[cfg(feature = "esp32-log")]
            ::esp_println::println!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", feature = "esp32-log")))]
            let _ = ($( & $x ),*);
        }
    };
}
