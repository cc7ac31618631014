use std::str::FromStr;

use crate::types::ServiceType;

pub fn parse_service(service: &str) -> Result<ServiceType, String> {
    ServiceType::from_str(service).map_err(|e| e.to_string())
}
