use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid data in checklist instance {instance_id}: {reason}")]
    InvalidChecklistData { instance_id: Uuid, reason: String },
    #[error("no '{template}' checklist found for question {question_id}")]
    MissingRelatedChecklist { template: String, question_id: Uuid },
    #[error("unknown template: {0}")]
    UnknownTemplate(Uuid),

    #[error("blob store error: {0}")]
    BlobStore(#[from] report_files::FilesError),
    #[error("text generation failed: {0}")]
    TextGeneration(String),
    #[error("document error: {0}")]
    Docx(#[from] report_docx::DocxError),
    #[error("document conversion failed: {0}")]
    Conversion(String),

    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(#[from] serde_json::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(#[from] serde_yaml::Error),

    #[error("report generation failed at {stage}: {source}")]
    GenerationFailed {
        stage: &'static str,
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    pub(crate) fn invalid_data(instance_id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidChecklistData {
            instance_id,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
