//! Station-mode WiFi for the rotor board.
//!
//! SSID and passphrase are baked in at build time; addressing (DHCP or a
//! fixed IPv4 setup) comes from the persisted [`NetworkConfig`].

use std::net::Ipv4Addr;

use anyhow::anyhow;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::ipv4::{
    ClientConfiguration as IpClientConfiguration, ClientSettings, Configuration as IpConfiguration,
    Mask, Subnet,
};
use esp_idf_svc::netif::{EspNetif, NetifConfiguration, NetifStack};
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi, WifiDriver};

use crate::config::NetworkConfig;

/// Connected WiFi station. Dropping it tears the link down.
pub struct Esp32Wifi<'a> {
    wifi: BlockingWifi<EspWifi<'a>>,
}

impl<'a> Esp32Wifi<'a> {
    /// Joins `ssid` and blocks until the station interface is up.
    ///
    /// With `network.use_dhcp` off the station netif is created with the
    /// static address, subnet and gateway (the gateway doubles as DNS).
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        ssid: &str,
        password: &str,
        network: &NetworkConfig,
    ) -> anyhow::Result<Self> {
        let credentials = station_credentials(ssid, password)?;

        let driver = WifiDriver::new(modem, sysloop.clone(), nvs)?;
        let sta = if network.use_dhcp {
            EspNetif::new(NetifStack::Sta)?
        } else {
            log::info!("WiFi using static address {}", network.static_ip);
            EspNetif::new_with_conf(&static_netif(network)?)?
        };
        let ap = EspNetif::new(NetifStack::Ap)?;
        let mut wifi = BlockingWifi::wrap(EspWifi::wrap_all(driver, sta, ap)?, sysloop)?;

        wifi.set_configuration(&credentials)?;
        wifi.start()?;
        log::info!("WiFi joining '{}'", ssid);
        wifi.connect()?;
        wifi.wait_netif_up()?;

        let this = Self { wifi };
        match this.ip_addr() {
            Some(ip) => log::info!("WiFi up, address {}", ip),
            None => log::warn!("WiFi up but no address reported"),
        }
        Ok(this)
    }

    /// Station address, once assigned.
    pub fn ip_addr(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
    }
}

fn station_credentials(ssid: &str, password: &str) -> anyhow::Result<Configuration> {
    if ssid.is_empty() {
        return Err(anyhow!("WIFI_SSID was not set at build time"));
    }
    let ssid: heapless::String<32> = ssid
        .try_into()
        .map_err(|_| anyhow!("SSID longer than 32 bytes"))?;
    let password: heapless::String<64> = password
        .try_into()
        .map_err(|_| anyhow!("WiFi passphrase longer than 64 bytes"))?;
    Ok(Configuration::Client(ClientConfiguration {
        ssid,
        password,
        ..Default::default()
    }))
}

/// Station netif configuration for fixed addressing.
fn static_netif(network: &NetworkConfig) -> anyhow::Result<NetifConfiguration> {
    let ip: Ipv4Addr = network.static_ip.as_str().parse()?;
    let gateway: Ipv4Addr = network.static_gateway.as_str().parse()?;
    let subnet: Ipv4Addr = network.static_subnet.as_str().parse()?;
    let mask = Mask(u32::from(subnet).count_ones() as u8);

    Ok(NetifConfiguration {
        ip_configuration: Some(IpConfiguration::Client(IpClientConfiguration::Fixed(
            ClientSettings {
                ip,
                subnet: Subnet { gateway, mask },
                dns: Some(gateway),
                secondary_dns: None,
            },
        ))),
        ..NetifConfiguration::wifi_default_client()
    })
}
