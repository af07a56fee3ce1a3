//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements         | Connects to                 |
//! |--------------|--------------------|-----------------------------|
//! | `hardware`   | FramePort          | OV2640 via esp32-camera     |
//! |              | LidPort            | Servo on LEDC               |
//! |              | MotionPort         | PIR GPIO + ISR queue        |
//! |              | ClockPort          | ESP32 system timer          |
//! | `i2c`        | BatteryPort        | MAX17048 fuel gauge         |
//! | `fram_store` | ConfigPort         | MB85RC FRAM                 |
//! | `power`      | PowerPort          | Light-sleep wake sources    |
//! | `log_sink`   | EventSink          | Serial log output           |
//! | `time`       | ClockPort          | ESP32 system timer          |

pub mod camera;
pub mod fram_store;
pub mod hardware;
pub mod i2c;
pub mod log_sink;
pub mod power;
pub mod time;
