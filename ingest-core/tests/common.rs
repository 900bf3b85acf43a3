#![allow(dead_code)]

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Current-conditions payload as Weatherstack returns it for New York.
pub fn new_york_payload() -> Value {
    json!({
        "request": {
            "type": "City",
            "query": "New York, United States of America",
            "language": "en",
            "unit": "m"
        },
        "location": {
            "name": "New York",
            "country": "United States of America",
            "region": "New York",
            "lat": "40.714",
            "lon": "-74.006",
            "timezone_id": "America/New_York",
            "localtime": "2025-08-13 03:40",
            "localtime_epoch": 1755056400,
            "utc_offset": "-4.0"
        },
        "current": {
            "observation_time": "07:40 AM",
            "temperature": 26,
            "weather_code": 116,
            "weather_descriptions": ["Partly Cloudy "],
            "wind_speed": 8,
            "wind_degree": 229,
            "wind_dir": "SW",
            "pressure": 1015,
            "precip": 0,
            "humidity": 71,
            "cloudcover": 0,
            "feelslike": 29,
            "uv_index": 0,
            "visibility": 16,
            "is_day": "no"
        }
    })
}

pub async fn mount_current(server: &MockServer, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path("/current"))
        .and(query_param("access_key", "KEY"))
        .and(query_param("query", "New York"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}
