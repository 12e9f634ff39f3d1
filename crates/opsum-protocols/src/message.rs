//! Sequenced op log messages and typed views of summary messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SummaryError;

/// Type tag of a sequenced message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Normal document op.
    #[serde(rename = "op")]
    Operation,
    #[serde(rename = "join")]
    ClientJoin,
    #[serde(rename = "leave")]
    ClientLeave,
    #[serde(rename = "propose")]
    Propose,
    #[serde(rename = "reject")]
    Reject,
    /// Explicit user request to summarize.
    #[serde(rename = "saveOp")]
    Save,
    #[serde(rename = "summarize")]
    Summarize,
    #[serde(rename = "summaryAck")]
    SummaryAck,
    #[serde(rename = "summaryNack")]
    SummaryNack,
    #[serde(rename = "noop")]
    NoOp,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Operation => "op",
            MessageType::ClientJoin => "join",
            MessageType::ClientLeave => "leave",
            MessageType::Propose => "propose",
            MessageType::Reject => "reject",
            MessageType::Save => "saveOp",
            MessageType::Summarize => "summarize",
            MessageType::SummaryAck => "summaryAck",
            MessageType::SummaryNack => "summaryNack",
            MessageType::NoOp => "noop",
        }
    }

    /// Membership and quorum messages.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            MessageType::ClientJoin
                | MessageType::ClientLeave
                | MessageType::Propose
                | MessageType::Reject
        )
    }

    /// Messages processed by the document runtime (as opposed to the quorum).
    pub fn is_runtime(&self) -> bool {
        matches!(
            self,
            MessageType::Operation
                | MessageType::Save
                | MessageType::Summarize
                | MessageType::SummaryAck
                | MessageType::SummaryNack
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message after the sequencer assigned it a position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencedDocumentMessage {
    /// Originating client; `None` for service-generated messages.
    #[serde(default)]
    pub client_id: Option<String>,

    pub sequence_number: u64,

    #[serde(default)]
    pub minimum_sequence_number: u64,

    #[serde(default)]
    pub client_sequence_number: u64,

    #[serde(default)]
    pub reference_sequence_number: u64,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    #[serde(default)]
    pub contents: Value,

    /// System payload (e.g. the JSON-encoded leaving client id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl SequencedDocumentMessage {
    pub fn new(message_type: MessageType, sequence_number: u64) -> Self {
        Self {
            client_id: None,
            sequence_number,
            minimum_sequence_number: 0,
            client_sequence_number: 0,
            reference_sequence_number: 0,
            message_type,
            contents: Value::Null,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>, client_sequence_number: u64) -> Self {
        self.client_id = Some(client_id.into());
        self.client_sequence_number = client_sequence_number;
        self
    }

    pub fn with_reference(mut self, reference_sequence_number: u64) -> Self {
        self.reference_sequence_number = reference_sequence_number;
        self
    }

    pub fn with_contents(mut self, contents: Value) -> Self {
        self.contents = contents;
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The departing client id carried by a client-leave message.
    pub fn leaving_client_id(&self) -> Result<String, SummaryError> {
        self.expect_type(MessageType::ClientLeave)?;
        let data = self.data.as_deref().ok_or_else(|| self.malformed("leave without data"))?;
        Ok(serde_json::from_str::<String>(data)?)
    }

    fn expect_type(&self, expected: MessageType) -> Result<(), SummaryError> {
        if self.message_type != expected {
            return Err(SummaryError::UnexpectedMessageType {
                expected,
                actual: self.message_type,
            });
        }
        Ok(())
    }

    fn malformed(&self, message: &str) -> SummaryError {
        SummaryError::MalformedMessage {
            sequence_number: self.sequence_number,
            message: message.to_string(),
        }
    }

    fn parse_contents<T: for<'de> Deserialize<'de>>(&self) -> Result<T, SummaryError> {
        serde_json::from_value(self.contents.clone()).map_err(|e| self.malformed(&e.to_string()))
    }
}

/// Contents of a summarize op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryProposalContents {
    /// Storage handle of the uploaded summary tree.
    pub handle: String,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,

    #[serde(default)]
    pub parents: Vec<String>,
}

/// Reference from an ack/nack back to the summarize op it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryProposal {
    pub summary_sequence_number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAckContents {
    pub handle: String,
    pub summary_proposal: SummaryProposal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryNackContents {
    #[serde(default)]
    pub error_message: String,
    pub summary_proposal: SummaryProposal,
}

/// A sequenced summarize op.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOp {
    pub client_id: Option<String>,
    pub sequence_number: u64,
    pub client_sequence_number: u64,
    pub reference_sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub contents: SummaryProposalContents,
}

impl TryFrom<&SequencedDocumentMessage> for SummaryOp {
    type Error = SummaryError;

    fn try_from(op: &SequencedDocumentMessage) -> Result<Self, Self::Error> {
        op.expect_type(MessageType::Summarize)?;
        Ok(Self {
            client_id: op.client_id.clone(),
            sequence_number: op.sequence_number,
            client_sequence_number: op.client_sequence_number,
            reference_sequence_number: op.reference_sequence_number,
            timestamp: op.timestamp,
            contents: op.parse_contents()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryAck {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub contents: SummaryAckContents,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryNack {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub contents: SummaryNackContents,
}

/// The sequencer's verdict on a summarize op.
#[derive(Debug, Clone, PartialEq)]
pub enum AckNack {
    Ack(SummaryAck),
    Nack(SummaryNack),
}

impl AckNack {
    pub fn is_ack(&self) -> bool {
        matches!(self, AckNack::Ack(_))
    }

    /// Sequence number of the summarize op this answers.
    pub fn summary_sequence_number(&self) -> u64 {
        match self {
            AckNack::Ack(ack) => ack.contents.summary_proposal.summary_sequence_number,
            AckNack::Nack(nack) => nack.contents.summary_proposal.summary_sequence_number,
        }
    }

    pub fn sequence_number(&self) -> u64 {
        match self {
            AckNack::Ack(ack) => ack.sequence_number,
            AckNack::Nack(nack) => nack.sequence_number,
        }
    }
}

impl TryFrom<&SequencedDocumentMessage> for AckNack {
    type Error = SummaryError;

    fn try_from(op: &SequencedDocumentMessage) -> Result<Self, Self::Error> {
        match op.message_type {
            MessageType::SummaryAck => Ok(AckNack::Ack(SummaryAck {
                sequence_number: op.sequence_number,
                timestamp: op.timestamp,
                contents: op.parse_contents()?,
            })),
            MessageType::SummaryNack => Ok(AckNack::Nack(SummaryNack {
                sequence_number: op.sequence_number,
                timestamp: op.timestamp,
                contents: op.parse_contents()?,
            })),
            actual => Err(SummaryError::UnexpectedMessageType {
                expected: MessageType::SummaryAck,
                actual,
            }),
        }
    }
}

/// A summarize op together with the ack that accepted it.
#[derive(Debug, Clone, PartialEq)]
pub struct AckedSummary {
    pub summary_op: SummaryOp,
    pub summary_ack: SummaryAck,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
