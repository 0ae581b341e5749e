use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of mutation a change event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    Replace,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Replace => "replace",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown operation kind: {other}")),
        }
    }
}

/// A mutation observed on a watched collection. Exists only in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub operation: OperationKind,
    /// Record snapshot at emission time. Poll batches carry an array.
    pub full_document: Value,
}

impl ChangeEvent {
    pub fn new(collection: impl Into<String>, operation: OperationKind, full_document: Value) -> Self {
        Self {
            collection: collection.into(),
            operation,
            full_document,
        }
    }

    /// Wire form pushed to realtime clients.
    pub fn to_message(&self) -> ChangeMessage {
        ChangeMessage::from(self.clone())
    }
}

/// Server → Client realtime push.
/// Wire: `{ "type": "change", "collection": "workers", "operation": "update", "document": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub collection: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub document: Value,
}

pub const CHANGE_FRAME: &str = "change";

impl From<ChangeEvent> for ChangeMessage {
    fn from(ev: ChangeEvent) -> Self {
        Self {
            frame_type: CHANGE_FRAME.to_string(),
            collection: ev.collection,
            operation: ev.operation,
            document: ev.full_document,
        }
    }
}

impl ChangeMessage {
    /// Parse one inbound text frame. Frames of any other `type` are rejected.
    pub fn parse(text: &str) -> Result<ChangeEvent, crate::ProtocolError> {
        let msg: ChangeMessage = serde_json::from_str(text)?;
        if msg.frame_type != CHANGE_FRAME {
            return Err(crate::ProtocolError::UnexpectedFrame(msg.frame_type));
        }
        Ok(ChangeEvent {
            collection: msg.collection,
            operation: msg.operation,
            full_document: msg.document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_kind_parses_wire_names() {
        for op in ["insert", "update", "delete", "replace"] {
            let parsed: OperationKind = op.parse().unwrap();
            assert_eq!(parsed.as_str(), op);
        }
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn parse_rejects_other_frame_types() {
        let err = ChangeMessage::parse(
            r#"{"type":"tick","collection":"workers","operation":"update","document":{}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, crate::ProtocolError::UnexpectedFrame(t) if t == "tick"));
    }

    #[test]
    fn parse_tolerates_missing_document() {
        let ev = ChangeMessage::parse(r#"{"type":"change","collection":"jobs","operation":"delete"}"#)
            .unwrap();
        assert_eq!(ev.operation, OperationKind::Delete);
        assert!(ev.full_document.is_null());
    }
}
