//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements     | Connects to                    |
//! |---------------|----------------|--------------------------------|
//! | `board`       | all tag ports  | one adapter per port           |
//! | `hardware`    | HardwarePort   | `embedded-hal` LED pins        |
//! | `image_store` | ImageStorePort | RAM image slots                |
//! | `log_sink`    | EventSink      | `log` facade                   |
//! | `radio`       | RadioPort      | radio task command channel     |
//! | `settings`    | SettingsPort   | namespaced key/value store     |
//! | `time`        | (none)         | monotonic millisecond clock    |

pub mod board;
pub mod hardware;
pub mod image_store;
pub mod log_sink;
pub mod radio;
pub mod settings;
pub mod time;
