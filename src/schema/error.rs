use thiserror::Error;

/// Schema 错误类型
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema validation failed at `{}`: {message}", render_path(.path))]
    Validation { message: String, path: Vec<String> },
}

impl SchemaError {
    pub fn path(&self) -> &[String] {
        match self {
            SchemaError::Validation { path, .. } => path,
        }
    }
}

fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        format!("$.{}", path.join("."))
    }
}
