//! 天気取得ツール（adapter 層）
//!
//! 緯度・経度・タイムゾーンを受け取り、予報文字列を返す。
//! 入力スキーマは静的に宣言し、実行時は serde で WeatherForecast に落とす。

use common::tool::{Tool, ToolError, ToolSpec};
use serde::Deserialize;
use serde_json::Value;

const FORECAST: &str = "Rainy / Max: 24°C / Min: 18°C";

/// get_weather の入力
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeatherForecast {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

/// 天気取得ツール（API 名 "get_weather"）
pub struct GetWeatherTool;

impl GetWeatherTool {
    pub const NAME: &'static str = "get_weather";

    pub fn new() -> Self {
        Self
    }
}

impl Default for GetWeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for GetWeatherTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: Self::NAME,
            description: "Get the current weather in given location",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "number",
                        "title": "Latitude",
                        "description": "Latitude for weather forcast api"
                    },
                    "longitude": {
                        "type": "number",
                        "title": "Longitude",
                        "description": "Longitude for weather forcast api"
                    },
                    "timezone": {
                        "type": "string",
                        "title": "Timezone",
                        "description": "Time zone",
                        "examples": ["Asia/Tokyo"]
                    }
                },
                "required": ["latitude", "longitude", "timezone"]
            }),
        }
    }

    fn call(&self, input: &Value) -> Result<Value, ToolError> {
        let params = WeatherForecast::deserialize(input)
            .map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        if !(-90.0..=90.0).contains(&params.latitude) {
            return Err(ToolError::InvalidArgs(format!(
                "latitude out of range: {}",
                params.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&params.longitude) {
            return Err(ToolError::InvalidArgs(format!(
                "longitude out of range: {}",
                params.longitude
            )));
        }
        if params.timezone.trim().is_empty() {
            return Err(ToolError::InvalidArgs("timezone must not be empty".to_string()));
        }
        // 予報 API は繋いでいないので固定値
        Ok(Value::String(FORECAST.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_weather_osaka() {
        let out = GetWeatherTool::new()
            .call(&json!({"latitude": 34.6, "longitude": 135.5, "timezone": "Asia/Tokyo"}))
            .unwrap();
        assert_eq!(out, json!("Rainy / Max: 24°C / Min: 18°C"));
    }

    #[test]
    fn test_get_weather_missing_field() {
        let err = GetWeatherTool::new()
            .call(&json!({"latitude": 34.6}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(ref m) if m.contains("longitude")));
    }

    #[test]
    fn test_get_weather_out_of_range() {
        let err = GetWeatherTool::new()
            .call(&json!({"latitude": 134.6, "longitude": 0.0, "timezone": "UTC"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn test_spec_declares_schema() {
        let spec = GetWeatherTool::new().spec();
        assert_eq!(spec.name, "get_weather");
        assert_eq!(spec.input_schema["properties"]["timezone"]["examples"][0], "Asia/Tokyo");
    }
}
