//! Access tokens provisioned in the configuration file

use std::collections::HashMap;

use async_trait::async_trait;
use matrixon_core::{config::StaticDevice, traits::DeviceLookup, types::Device, Result};

pub struct StaticDevices {
    by_token: HashMap<String, Device>,
}

impl StaticDevices {
    pub fn new(devices: &[StaticDevice]) -> Self {
        let by_token = devices
            .iter()
            .map(|device| {
                (
                    device.access_token.clone(),
                    Device {
                        user_id: device.user_id.clone(),
                        device_id: device.device_id.clone(),
                    },
                )
            })
            .collect();
        Self { by_token }
    }
}

#[async_trait]
impl DeviceLookup for StaticDevices {
    async fn device_for_token(&self, access_token: &str) -> Result<Option<Device>> {
        Ok(self.by_token.get(access_token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_token() {
        let devices = StaticDevices::new(&[StaticDevice {
            access_token: "secret".to_owned(),
            user_id: "@alice:example.org".to_owned(),
            device_id: "ALICEDEVICE".to_owned(),
        }]);

        let device = devices.device_for_token("secret").await.unwrap().unwrap();
        assert_eq!(device.user_id, "@alice:example.org");
        assert!(devices.device_for_token("guess").await.unwrap().is_none());
    }
}
