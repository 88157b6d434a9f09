//! ESP32 DiSEqC rotor controller.
//!
//! This is the main entry point for the physical hardware controller.
//! It:
//! - Loads the runtime configuration from FRAM (defaults if absent)
//! - Powers the LNB at 13 V, tone off
//! - Builds the rotor service (RMT DiSEqC output + motor-enable GPIO)
//! - Connects to WiFi and the MQTT broker (if enabled)
//! - Runs a 20 Hz loop routing MQTT commands and publishing status
//!
//! # Build
//!
//! ```bash
//! # Rotor only (no network)
//! cargo build --release --features esp32
//!
//! # With WiFi + MQTT
//! WIFI_SSID=... WIFI_PASSWORD=... cargo build --release --features esp32-mqtt
//! ```

use diseqc_rotor::config::RotorConfig;
use diseqc_rotor::hal::esp32::{Esp32EnableLine, Esp32Transmitter, Lnbh26, Mb85rc16};
use diseqc_rotor::lnb::LnbService;
use diseqc_rotor::rotor::RotorService;
use diseqc_rotor::storage::{ConfigStore, FramConfigStore};
use esp_idf_hal::gpio::OutputPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::prelude::*;
use std::thread;
use std::time::Duration;

/// Main loop interval in milliseconds (20Hz)
const LOOP_INTERVAL_MS: u64 = 50;

/// Full status publish interval in loop ticks (every 200 ticks = 10s at 20Hz)
#[cfg(feature = "esp32-mqtt")]
const STATUS_PUBLISH_INTERVAL: u32 = 200;

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_hal::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("diseqc-rotor {} starting", env!("CARGO_PKG_VERSION"));

    let peripherals = Peripherals::take()?;

    // =========================================================================
    // Configuration (MB85RC16 FRAM on I2C1)
    // =========================================================================
    let fram_i2c = I2cDriver::new(
        peripherals.i2c1,
        peripherals.pins.gpio18, // SDA
        peripherals.pins.gpio19, // SCL
        &I2cConfig::new().baudrate(400.kHz().into()),
    )?;
    let mut store = FramConfigStore::new(Mb85rc16::new(fram_i2c));
    let (config, from_fram) = store.load_or_default();
    log::info!(
        "config loaded from {} (device {}, broker {}:{})",
        if from_fram { "FRAM" } else { "defaults" },
        config.system.device_name,
        config.mqtt.broker,
        config.mqtt.port
    );

    // =========================================================================
    // LNB supply (LNBH26 on I2C0)
    // =========================================================================
    let lnb_i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21, // SDA
        peripherals.pins.gpio22, // SCL
        &I2cConfig::new().baudrate(100.kHz().into()),
    )?;
    let lnbh26 = Lnbh26::new(lnb_i2c).map_err(|e| anyhow::anyhow!("LNBH26 init failed: {:?}", e))?;
    let lnb = LnbService::new(lnbh26)?;

    // =========================================================================
    // Rotor (RMT on GPIO5, motor enable on GPIO4)
    // =========================================================================
    let enable = Esp32EnableLine::new(peripherals.pins.gpio4.downgrade_output())?;
    let tx = Esp32Transmitter::new(peripherals.rmt.channel0, peripherals.pins.gpio5)?;
    let rotor = RotorService::new(enable, tx, RotorConfig::default())?;
    log::info!("rotor ready");

    // =========================================================================
    // WiFi + MQTT
    // =========================================================================
    #[cfg(feature = "esp32-mqtt")]
    {
        use diseqc_rotor::hal::esp32::{Esp32Mqtt, Esp32Wifi};
        use diseqc_rotor::services::MqttServiceRunner;
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use esp_idf_svc::nvs::EspDefaultNvsPartition;

        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;
        let _wifi = Esp32Wifi::new(
            peripherals.modem,
            sysloop,
            Some(nvs),
            option_env!("WIFI_SSID").unwrap_or(""),
            option_env!("WIFI_PASSWORD").unwrap_or(""),
            &config.network,
        )?;

        let client = Esp32Mqtt::new(&config.mqtt)?;
        let mut runner = MqttServiceRunner::new(rotor, client, lnb, store, config);
        runner.subscribe_control_topics()?;
        runner.announce()?;
        log::info!("MQTT command router running");

        let mut tick: u32 = 0;
        loop {
            if let Err(e) = runner.poll() {
                log::warn!("MQTT poll failed: {}", e);
            }
            if let Err(e) = runner.publish_if_changed() {
                log::warn!("status publish failed: {}", e);
            }

            tick += 1;
            if tick >= STATUS_PUBLISH_INTERVAL {
                tick = 0;
                if let Err(e) = runner.publish_periodic_status() {
                    log::warn!("periodic status failed: {}", e);
                }
            }

            thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
        }
    }

    // =========================================================================
    // Standalone loop (no network)
    // =========================================================================
    #[cfg(not(feature = "esp32-mqtt"))]
    {
        use diseqc_rotor::traits::RotorBackend;

        let mut rotor = rotor;
        let _lnb = lnb;
        let _store = store;
        log::info!("no network features enabled; holding position");
        loop {
            let _ = rotor.poll();
            thread::sleep(Duration::from_millis(LOOP_INTERVAL_MS));
        }
    }
}
