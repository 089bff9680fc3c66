//! Participant network info.
//!
//! Disabled by default; when collection is off, placeholder values stand in
//! so downstream columns stay uniform.

use stim_core::Envelope;
use stim_net::Remote;
use tracing::debug;

/// Coarse network-derived information about the participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantInfo {
    pub ip: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ParticipantInfo {
    /// The stand-in used when collection is disabled.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            ip: "X".into(),
            country: "X".into(),
            latitude: None,
            longitude: None,
        }
    }

    /// Fetch participant info from a geo endpoint.
    ///
    /// # Errors
    ///
    /// Returns an envelope on transport failure; missing fields degrade to
    /// placeholders rather than failing, the info is best-effort.
    pub async fn fetch(remote: &dyn Remote, geo_url: &str) -> Result<Self, Envelope> {
        const ORIGIN: &str = "ParticipantInfo.fetch";
        debug!(url = geo_url, "fetching participant info");
        let document = remote.get_json(geo_url, &[]).await.map_err(Envelope::wrap(
            ORIGIN,
            "when getting the network information of the participant",
        ))?;
        let text = |key: &str| {
            document
                .get(key)
                .and_then(|value| value.as_str())
                .unwrap_or("X")
                .to_string()
        };
        let number = |key: &str| {
            document.get(key).and_then(|value| {
                value
                    .as_f64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
            })
        };
        Ok(Self {
            ip: text("geoplugin_request"),
            country: text("geoplugin_countryName"),
            latitude: number("geoplugin_latitude"),
            longitude: number("geoplugin_longitude"),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::json;
    use stim_net::NetError;

    use super::*;

    struct GeoRemote(serde_json::Value);

    #[async_trait]
    impl Remote for GeoRemote {
        async fn get_json(
            &self,
            _url: &str,
            _query: &[(&str, &str)],
        ) -> Result<serde_json::Value, NetError> {
            Ok(self.0.clone())
        }

        async fn post_form(
            &self,
            _url: &str,
            _query: &[(&str, &str)],
            _form: &[(&str, String)],
        ) -> Result<serde_json::Value, NetError> {
            Err(NetError::Protocol("unexpected post"))
        }

        async fn get_bytes(&self, _url: &str) -> Result<Bytes, NetError> {
            Err(NetError::Protocol("unexpected get_bytes"))
        }
    }

    #[tokio::test]
    async fn test_fetch_maps_geo_fields() {
        let remote = GeoRemote(json!({
            "geoplugin_request": "203.0.113.7",
            "geoplugin_countryName": "Iceland",
            "geoplugin_latitude": "64.1",
            "geoplugin_longitude": -21.9
        }));
        let info = ParticipantInfo::fetch(&remote, "http://geo").await.unwrap();
        assert_eq!(info.ip, "203.0.113.7");
        assert_eq!(info.country, "Iceland");
        assert_eq!(info.latitude, Some(64.1));
        assert_eq!(info.longitude, Some(-21.9));
    }

    #[tokio::test]
    async fn test_missing_fields_degrade_to_placeholders() {
        let remote = GeoRemote(json!({}));
        let info = ParticipantInfo::fetch(&remote, "http://geo").await.unwrap();
        assert_eq!(info, ParticipantInfo {
            ip: "X".into(),
            country: "X".into(),
            latitude: None,
            longitude: None,
        });
    }
}
