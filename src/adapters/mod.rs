//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements                          | Connects to            |
//! |-------------|-------------------------------------|------------------------|
//! | `esp_gpio`  | GpioDriver                          | ESP32 GPIO, ADC1, LEDC |
//! | `log_sink`  | (measurement subscriber)            | Serial log output      |
//! | `sim`       | GpioDriver, ExpanderDevice,         | In-memory state        |
//! |             | OneWireBus, TempHumidityDevice,     |                        |
//! |             | Clock                               |                        |
//! | `time`      | Clock                               | ESP32 system timer     |

#[cfg(all(target_os = "espidf", feature = "espidf"))]
pub mod esp_gpio;
pub mod log_sink;
pub mod sim;
pub mod time;
