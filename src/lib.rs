pub mod android_jni;
pub mod config;
pub mod direction;
pub mod error;
pub mod fall;
pub mod geo;
pub mod gpx;
pub mod nav;
pub mod nearest;
pub mod radar;

pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Route `log` output to logcat.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("HikeNav"),
    );
}

/// No-op off Android; hosts install their own `log` backend.
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}
