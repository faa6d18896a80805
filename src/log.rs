// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Logging macros.
//!
//! On the MCU these forward to `defmt` (transported over RTT, so the USART stays dedicated to
//! binary telemetry). On the host the arguments are only borrowed and nothing is printed.

macro_rules! info {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        defmt::info!($fmt $(, $arg)*);
        #[cfg(not(target_os = "none"))]
        {
            $(let _ = &$arg;)*
        }
    }};
}

macro_rules! warn {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        defmt::warn!($fmt $(, $arg)*);
        #[cfg(not(target_os = "none"))]
        {
            $(let _ = &$arg;)*
        }
    }};
}

macro_rules! error {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {{
        #[cfg(target_os = "none")]
        defmt::error!($fmt $(, $arg)*);
        #[cfg(not(target_os = "none"))]
        {
            $(let _ = &$arg;)*
        }
    }};
}
