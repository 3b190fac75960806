use serde::Deserialize;
use utoipa::ToSchema;

use crate::models::GeoPoint;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationReport {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationReport {
    pub fn into_point(self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}
