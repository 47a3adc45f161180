//! Endpoint key syntax (`network@address`) and metadata query-string parsing (§3, §6).

use std::collections::HashMap;

/// Splits `tcp@1.2.3.4:9000` into `("tcp", "1.2.3.4:9000")`. A bare address with
/// no `@` defaults to `tcp`, matching `splitNetworkAndAddress` in the original.
pub fn split_network_and_address(endpoint_key: &str) -> (&str, &str) {
    match endpoint_key.split_once('@') {
        Some((network, address)) => (network, address),
        None => ("tcp", endpoint_key),
    }
}

/// Parsed, recognized fields of an endpoint's metadata query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointMeta {
    pub state: Option<String>,
    pub group: Option<String>,
    pub weight: Option<u32>,
    pub typ: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub raw: HashMap<String, String>,
}

impl EndpointMeta {
    pub fn parse(query: &str) -> Self {
        let mut raw = HashMap::new();
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            raw.insert(k.into_owned(), v.into_owned());
        }

        EndpointMeta {
            state: raw.get("state").cloned(),
            group: raw.get("group").cloned(),
            weight: raw.get("weight").and_then(|w| w.parse().ok()),
            typ: raw.get("typ").cloned(),
            latitude: raw.get("latitude").and_then(|v| v.parse().ok()),
            longitude: raw.get("longitude").and_then(|v| v.parse().ok()),
            raw,
        }
    }

    pub fn is_inactive(&self) -> bool {
        self.state.as_deref() == Some("inactive")
    }

    /// `None` means native (Go-equivalent) backend; otherwise names the
    /// cross-language dispatcher (`py`, `rust`).
    pub fn non_native_kind(&self) -> Option<&str> {
        match self.typ.as_deref() {
            Some("py") => Some("py"),
            Some("rust") => Some("rust"),
            _ => None,
        }
    }
}

/// Drops endpoints whose metadata marks them `state=inactive` or whose `group`
/// doesn't match; idempotent by construction (re-filtering a filtered map is a
/// no-op). Mirrors `filterByStateAndGroup`.
pub fn filter_by_state_and_group(group: &str, servers: &mut HashMap<String, String>) {
    servers.retain(|_, meta_query| {
        let meta = EndpointMeta::parse(meta_query);
        if meta.is_inactive() {
            return false;
        }
        if !group.is_empty() && meta.group.as_deref() != Some(group) {
            return false;
        }
        true
    });
}

/// URL-encodes a metadata map as `k=v&k=v` with the trailing `&` stripped (§6).
pub fn urlencode_metadata(data: &HashMap<String, String>) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in data {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_network_and_address() {
        assert_eq!(split_network_and_address("tcp@1.2.3.4:9000"), ("tcp", "1.2.3.4:9000"));
        assert_eq!(split_network_and_address("1.2.3.4:9000"), ("tcp", "1.2.3.4:9000"));
        assert_eq!(split_network_and_address("inprocess@worker-1"), ("inprocess", "worker-1"));
    }

    #[test]
    fn parses_recognized_metadata_keys() {
        let meta = EndpointMeta::parse("state=inactive&group=g1&weight=3&typ=py&latitude=1.5&longitude=-2.25");
        assert_eq!(meta.state.as_deref(), Some("inactive"));
        assert_eq!(meta.group.as_deref(), Some("g1"));
        assert_eq!(meta.weight, Some(3));
        assert_eq!(meta.non_native_kind(), Some("py"));
        assert_eq!(meta.latitude, Some(1.5));
        assert_eq!(meta.longitude, Some(-2.25));
    }

    #[test]
    fn filter_by_state_and_group_is_idempotent() {
        let mut servers = HashMap::new();
        servers.insert("tcp@A".to_string(), "state=active&group=g1".to_string());
        servers.insert("tcp@B".to_string(), "state=inactive".to_string());
        servers.insert("tcp@C".to_string(), "group=g2".to_string());

        filter_by_state_and_group("g1", &mut servers);
        let once = servers.clone();
        filter_by_state_and_group("g1", &mut servers);

        assert_eq!(servers, once);
        assert!(servers.contains_key("tcp@A"));
        assert!(!servers.contains_key("tcp@B"));
        assert!(!servers.contains_key("tcp@C"));
    }
}
