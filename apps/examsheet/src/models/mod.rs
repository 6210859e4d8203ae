pub mod coordinate_map;
pub mod question;
pub mod recovery;
pub mod variant;

pub use coordinate_map::{
    exam_identifier, parse_exam_identifier, BubbleCoordinate, CoordinateMap, DocPoint,
    PageCoordinates, PageDescriptor, QuestionCoordinates,
};
pub use question::{Choice, ExamMeta, Question};
pub use recovery::{DetectedAnswer, RecoveryResult};
pub use variant::VariantMap;

/// Serde adapter for optional binary payloads carried as standard base64 strings in JSON.
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| STANDARD.decode(s.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
