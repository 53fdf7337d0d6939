use log::{info, warn};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::document::Document;
use crate::error::{RagError, RagResult};

/// Where recipe records come from.
#[derive(Debug, Clone)]
pub enum RecipeSource {
    /// A JSON array file, or JSON lines when the extension is `.jsonl`.
    File(PathBuf),
    Records(Vec<Value>),
}

/// One validated recipe record.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    pub ingredients: String,
    pub steps: String,
    pub description: Option<String>,
    pub source: Option<String>,
}

impl Recipe {
    /// Validates a raw record. `position` is the zero-based record index.
    pub fn from_record(position: usize, record: &Value) -> RagResult<Self> {
        let id = record
            .get("id")
            .and_then(scalar_to_string)
            .unwrap_or_else(|| format!("recipe-{}", position));

        let object = record.as_object().ok_or_else(|| RagError::MalformedRecord {
            position,
            id: id.clone(),
            field: "name".to_string(),
        })?;

        let required = |field: &str, separator: &str| -> RagResult<String> {
            object
                .get(field)
                .and_then(|v| field_to_string(v, separator))
                .ok_or_else(|| RagError::MalformedRecord {
                    position,
                    id: id.clone(),
                    field: field.to_string(),
                })
        };
        let optional = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            name: required("name", ", ")?,
            ingredients: required("ingredients", ", ")?,
            steps: required("steps", " ")?,
            description: optional("description"),
            source: optional("source"),
            id,
        })
    }

    /// The fixed framing every downstream prompt relies on.
    pub fn document_text(&self) -> String {
        format!(
            "Recipe: {}\nIngredients: {}\nSteps: {}",
            self.name, self.ingredients, self.steps
        )
    }

    pub fn into_document(self) -> Document {
        let mut document = Document::new(self.id.clone(), self.document_text())
            .with_metadata("name", self.name);
        if let Some(description) = self.description {
            document = document.with_metadata("description", description);
        }
        if let Some(source) = self.source {
            document = document.with_metadata("source", source);
        }
        document
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_to_string(value: &Value, separator: &str) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts = items
                .iter()
                .map(scalar_to_string)
                .collect::<Option<Vec<_>>>()?;
            Some(parts.join(separator))
        }
        _ => None,
    }
}

/// Turns raw recipe records into documents, failing on the first bad record.
pub struct CorpusLoader;

impl CorpusLoader {
    pub async fn load(source: RecipeSource) -> RagResult<Vec<Document>> {
        let records = match source {
            RecipeSource::File(path) => Self::read_records(&path).await?,
            RecipeSource::Records(records) => records,
        };
        Self::load_records(&records)
    }

    pub fn load_records(records: &[Value]) -> RagResult<Vec<Document>> {
        let documents = records
            .iter()
            .enumerate()
            .map(|(position, record)| Recipe::from_record(position, record).map(Recipe::into_document))
            .collect::<RagResult<Vec<_>>>()?;

        info!("Created {} recipe documents", documents.len());
        Ok(documents)
    }

    async fn read_records(path: &Path) -> RagResult<Vec<Value>> {
        info!("Loading recipes from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RagError::CorpusSource(format!("Failed to read {}: {}", path.display(), e)))?;

        let is_json_lines = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false);

        if is_json_lines {
            content
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(line_no, line)| {
                    serde_json::from_str(line).map_err(|e| {
                        RagError::CorpusSource(format!(
                            "Invalid JSON on line {} of {}: {}",
                            line_no + 1,
                            path.display(),
                            e
                        ))
                    })
                })
                .collect()
        } else {
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Array(records)) => Ok(records),
                Ok(_) => {
                    warn!("{} is not a JSON array of recipes", path.display());
                    Err(RagError::CorpusSource(format!(
                        "{} must contain a JSON array of recipe records",
                        path.display()
                    )))
                }
                Err(e) => Err(RagError::CorpusSource(format!(
                    "Invalid JSON in {}: {}",
                    path.display(),
                    e
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pancakes() -> Value {
        json!({"name": "Pancakes", "ingredients": "flour, egg, milk", "steps": "mix; cook"})
    }

    #[test]
    fn test_document_text_template() {
        let docs = CorpusLoader::load_records(&[pancakes()]).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].text,
            "Recipe: Pancakes\nIngredients: flour, egg, milk\nSteps: mix; cook"
        );
        assert_eq!(docs[0].name(), Some("Pancakes"));
        assert_eq!(docs[0].id, "recipe-0");
    }

    #[test]
    fn test_missing_ingredients_is_rejected() {
        let records = vec![
            pancakes(),
            json!({"id": "toast-1", "name": "Toast", "steps": "toast the bread"}),
        ];
        match CorpusLoader::load_records(&records) {
            Err(RagError::MalformedRecord { position, id, field }) => {
                assert_eq!(position, 1);
                assert_eq!(id, "toast-1");
                assert_eq!(field, "ingredients");
            }
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_null_field_is_not_defaulted() {
        let record = json!({"name": "Soup", "ingredients": "water", "steps": null});
        let err = CorpusLoader::load_records(&[record]).unwrap_err();
        assert!(matches!(err, RagError::MalformedRecord { ref field, .. } if field == "steps"));
    }

    #[test]
    fn test_array_fields_and_metadata() {
        let record = json!({
            "id": 42,
            "name": "Omelette",
            "ingredients": ["eggs", "butter", "salt"],
            "steps": ["Whisk the eggs.", "Cook in butter."],
            "description": "Quick breakfast",
            "source": "family"
        });
        let docs = CorpusLoader::load_records(&[record]).unwrap();
        assert_eq!(docs[0].id, "42");
        assert_eq!(
            docs[0].text,
            "Recipe: Omelette\nIngredients: eggs, butter, salt\nSteps: Whisk the eggs. Cook in butter."
        );
        assert_eq!(docs[0].metadata.get("description").unwrap(), "Quick breakfast");
        assert_eq!(docs[0].metadata.get("source").unwrap(), "family");
    }

    #[test]
    fn test_identical_records_yield_identical_documents() {
        let a = CorpusLoader::load_records(&[pancakes()]).unwrap();
        let b = CorpusLoader::load_records(&[pancakes()]).unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_load_json_lines_file() {
        let path = std::env::temp_dir().join(format!("recipes-{}.jsonl", std::process::id()));
        let content = format!(
            "{}\n\n{}\n",
            pancakes(),
            json!({"name": "Salad", "ingredients": "lettuce", "steps": "toss"})
        );
        tokio::fs::write(&path, content).await.unwrap();

        let docs = CorpusLoader::load(RecipeSource::File(path.clone())).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].name(), Some("Salad"));
    }

    #[tokio::test]
    async fn test_missing_file_is_a_source_error() {
        let path = PathBuf::from("/nonexistent/recipes.json");
        let err = CorpusLoader::load(RecipeSource::File(path)).await.unwrap_err();
        assert!(matches!(err, RagError::CorpusSource(_)));
    }
}
