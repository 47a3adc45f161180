use rpcx_share::{CompressType, Message, MessageStatusType, MessageType, Metadata};

pub const HEADER_VERSION: &str = "X-RPCX-Version";
pub const HEADER_MESSAGE_TYPE: &str = "X-RPCX-MesssageType";
pub const HEADER_HEARTBEAT: &str = "X-RPCX-Heartbeat";
pub const HEADER_ONEWAY: &str = "X-RPCX-Oneway";
pub const HEADER_MESSAGE_STATUS_TYPE: &str = "X-RPCX-MessageStatusType";
pub const HEADER_SERIALIZE_TYPE: &str = "X-RPCX-SerializeType";
pub const HEADER_MESSAGE_ID: &str = "X-RPCX-MessageID";
pub const HEADER_SERVICE_PATH: &str = "X-RPCX-ServicePath";
pub const HEADER_SERVICE_METHOD: &str = "X-RPCX-ServiceMethod";
pub const HEADER_META: &str = "X-RPCX-Meta";
pub const HEADER_ERROR_MESSAGE: &str = "X-RPCX-ErrorMessage";
pub const HEADER_CONTENT_ENCODING: &str = "Content-Encoding";

/// A response delivered to a raw call: the wire header fields folded into a
/// string-keyed map, plus the payload left exactly as received (undecoded).
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub headers: Metadata,
    pub payload: Vec<u8>,
}

impl RawResponse {
    pub(crate) fn from_message(msg: &Message, error_text: Option<&str>) -> RawResponse {
        let mut headers = Metadata::new();
        headers.insert(HEADER_VERSION.to_string(), "1".to_string());
        headers.insert(
            HEADER_MESSAGE_TYPE.to_string(),
            match msg.message_type {
                MessageType::Request => "Request".to_string(),
                MessageType::Response => "Response".to_string(),
            },
        );
        if msg.is_heartbeat() {
            headers.insert(HEADER_HEARTBEAT.to_string(), "true".to_string());
        }
        if msg.is_oneway() {
            headers.insert(HEADER_ONEWAY.to_string(), "true".to_string());
        }
        headers.insert(
            HEADER_MESSAGE_STATUS_TYPE.to_string(),
            match msg.status {
                MessageStatusType::Normal => "Normal".to_string(),
                MessageStatusType::Error => "Error".to_string(),
            },
        );
        headers.insert(
            HEADER_SERIALIZE_TYPE.to_string(),
            msg.serialize_type.as_u8().to_string(),
        );
        headers.insert(HEADER_MESSAGE_ID.to_string(), msg.seq().to_string());
        headers.insert(HEADER_SERVICE_PATH.to_string(), msg.service_path.clone());
        headers.insert(HEADER_SERVICE_METHOD.to_string(), msg.service_method.clone());
        if !msg.metadata.is_empty() {
            headers.insert(
                HEADER_META.to_string(),
                rpcx_share::urlencode_metadata(&msg.metadata),
            );
        }
        if matches!(msg.compress_type, CompressType::Gzip) {
            headers.insert(HEADER_CONTENT_ENCODING.to_string(), "gzip".to_string());
        }
        if let Some(text) = error_text {
            headers.insert(HEADER_ERROR_MESSAGE.to_string(), text.to_string());
        }
        RawResponse {
            headers,
            payload: msg.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcx_share::get_pooled_msg;

    #[test]
    fn converts_a_response_message_into_a_flat_header_map() {
        let mut msg = get_pooled_msg();
        msg.service_path = "Arith".to_string();
        msg.service_method = "Mul".to_string();
        msg.payload = vec![1, 2, 3];
        let raw = RawResponse::from_message(&msg, None);
        assert_eq!(raw.headers.get(HEADER_SERVICE_PATH).unwrap(), "Arith");
        assert_eq!(raw.headers.get(HEADER_SERVICE_METHOD).unwrap(), "Mul");
        assert_eq!(raw.payload, vec![1, 2, 3]);
        assert!(!raw.headers.contains_key(HEADER_ERROR_MESSAGE));
    }

    #[test]
    fn injects_the_error_message_header_on_service_errors() {
        let msg = get_pooled_msg();
        let raw = RawResponse::from_message(&msg, Some("divide by zero"));
        assert_eq!(raw.headers.get(HEADER_ERROR_MESSAGE).unwrap(), "divide by zero");
    }
}
