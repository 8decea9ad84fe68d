/// 备选路线 (Alternative routes)
///
/// 事故发生时查询主路到两个出口的实时通行时间 (Google Directions API)
/// 不缓存、不重试; 查询失败显示 "N/A"
use std::collections::BTreeMap;
use std::time::Duration;

use phf::phf_map;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::incident::GeoPoint;

pub const NOT_AVAILABLE: &str = "N/A";

pub const DIRECTIONS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";

/// 双语路名
#[derive(Debug, Clone, Copy)]
pub struct Road {
    pub name: &'static str,
    pub name_ar: &'static str,
    /// 地理编码用的地址
    pub address: &'static str,
}

pub static MAIN_ROAD: Road = Road {
    name: "Makkah Al Mukarramah Road",
    name_ar: "طريق مكة المكرمة",
    address: "Makkah Al Mukarramah Road, Riyadh",
};

/// 出口 → 路线
pub static EXITS: phf::Map<&'static str, Road> = phf_map! {
    "left" => Road {
        name: "King Fahad Branch Rd",
        name_ar: "طريق الملك فهد",
        address: "King Fahad Branch Rd, Riyadh",
    },
    "right" => Road {
        name: "Olaya Street",
        name_ar: "شارع العليا",
        address: "Olaya Street, Riyadh",
    },
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteStatus {
    pub name: &'static str,
    pub name_ar: &'static str,
    pub time: String,
}

pub type AlternativeRoutes = BTreeMap<&'static str, RouteStatus>;

/// 路线查询服务
pub trait DirectionsProvider: Send + Sync {
    /// 实时路况下的行驶时间文本 (例如 "12 mins"); 无结果时为 None
    fn duration_in_traffic(&self, origin: &str, destination: &str) -> Result<Option<String>>;
}

/// 没有活动事故时返回空表
pub fn alternative_routes(
    provider: &dyn DirectionsProvider,
    location: Option<GeoPoint>,
) -> AlternativeRoutes {
    let mut routes = AlternativeRoutes::new();
    if location.is_none() {
        return routes;
    }

    for (&key, road) in EXITS.entries() {
        let time = match provider.duration_in_traffic(MAIN_ROAD.address, road.address) {
            Ok(Some(text)) => text,
            Ok(None) => NOT_AVAILABLE.to_string(),
            Err(e) => {
                warn!("⚠️ 路线查询失败 ({}): {}", road.name, e);
                NOT_AVAILABLE.to_string()
            }
        };
        routes.insert(
            key,
            RouteStatus {
                name: road.name,
                name_ar: road.name_ar,
                time,
            },
        );
    }
    routes
}

// ========== Google Directions ==========

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    #[serde(default)]
    duration_in_traffic: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
}

impl DirectionsResponse {
    fn into_duration(self) -> Result<Option<String>> {
        match self.status.as_str() {
            "OK" => Ok(self
                .routes
                .into_iter()
                .next()
                .and_then(|r| r.legs.into_iter().next())
                .and_then(|l| l.duration_in_traffic)
                .map(|d| d.text)),
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(None),
            status => Err(Error::Directions(match self.error_message {
                Some(msg) => format!("{}: {}", status, msg),
                None => status.to_string(),
            })),
        }
    }
}

pub struct GoogleDirections {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
}

impl GoogleDirections {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(api_key, DIRECTIONS_ENDPOINT)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            agent,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl DirectionsProvider for GoogleDirections {
    fn duration_in_traffic(&self, origin: &str, destination: &str) -> Result<Option<String>> {
        let response: DirectionsResponse = self
            .agent
            .get(&self.endpoint)
            .query("origin", origin)
            .query("destination", destination)
            .query("mode", "driving")
            .query("departure_time", "now")
            .query("key", &self.api_key)
            .call()
            .map_err(|e| Error::Directions(e.to_string()))?
            .into_json()?;
        response.into_duration()
    }
}
