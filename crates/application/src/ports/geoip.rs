use async_trait::async_trait;
use std::net::IpAddr;

use vigil_domain::CoreError;

/// An accuracy radius above this is treated as "no useful location".
pub const MAX_USEFUL_ACCURACY_KM: u32 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub country: String,
    pub asn: u32,
    pub coordinates: Option<(f64, f64)>,
    pub accuracy_km: u32,
}

impl Location {
    pub fn is_useful(&self) -> bool {
        self.accuracy_km <= MAX_USEFUL_ACCURACY_KM
    }
}

#[async_trait]
pub trait GeoIpPort: Send + Sync {
    async fn location(&self, ip: IpAddr) -> Result<Option<Location>, CoreError>;
}
