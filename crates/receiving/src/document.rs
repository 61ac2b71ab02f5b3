//! Supporting-document metadata attached to a receiving (no file storage here).

use serde::{Deserialize, Serialize};

/// Accepted document types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    DeliveryChallan,
    CertificateOfAnalysis,
    PackingList,
    TemperatureLog,
    /// Requires a custom label.
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        DocumentType::Invoice,
        DocumentType::DeliveryChallan,
        DocumentType::CertificateOfAnalysis,
        DocumentType::PackingList,
        DocumentType::TemperatureLog,
        DocumentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::DeliveryChallan => "delivery_challan",
            DocumentType::CertificateOfAnalysis => "certificate_of_analysis",
            DocumentType::PackingList => "packing_list",
            DocumentType::TemperatureLog => "temperature_log",
            DocumentType::Other => "other",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DocumentType::Invoice => "Invoice",
            DocumentType::DeliveryChallan => "Delivery Challan",
            DocumentType::CertificateOfAnalysis => "Certificate of Analysis",
            DocumentType::PackingList => "Packing List",
            DocumentType::TemperatureLog => "Temperature Log",
            DocumentType::Other => "Other",
        }
    }
}

/// Metadata for one uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingDocument {
    pub file_name: String,
    /// `None` until the user picks a type.
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    /// Free-text type name, used with [`DocumentType::Other`].
    #[serde(default)]
    pub custom_label: Option<String>,
}

impl ReceivingDocument {
    pub fn new(file_name: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            file_name: file_name.into(),
            document_type: Some(document_type),
            custom_label: None,
        }
    }

    pub fn other(file_name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            document_type: Some(DocumentType::Other),
            custom_label: Some(label.into()),
        }
    }

    /// Resolved type name, or `None` when the type is missing or an
    /// "other" document has no label.
    pub fn type_label(&self) -> Option<&str> {
        match self.document_type? {
            DocumentType::Other => self
                .custom_label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty()),
            t => Some(t.display_name()),
        }
    }
}
