//! Reusable shape templates.
//!
//! A handful of built-in lot shapes are always available and cannot be
//! changed. User templates are kept as one JSON array in a key-value
//! store under [`STORAGE_KEY`].

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlanError;
use crate::reconstruct::{reconstruct, validate_dimensions, ReconstructedShape};

/// Key under which user templates are persisted.
pub const STORAGE_KEY: &str = "plan2poly.templates";

// ── Storage ──────────────────────────────────────────────

/// Minimal string key-value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlanError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PlanError>;
    fn remove(&mut self, key: &str) -> Result<(), PlanError>;
}

/// In-process store, lost on drop.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlanError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PlanError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PlanError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, PlanError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&path)?))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PlanError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PlanError> {
        let path = self.path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}

// ── Templates ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateCategory {
    BuiltIn,
    User,
}

/// A named list of edge lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: TemplateCategory,
    /// Edge lengths in metres, in walk order.
    pub dimensions: Vec<f64>,
    pub edge_count: usize,
    /// Expected area in m², if known.
    #[serde(default)]
    pub area: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShapeTemplate {
    pub fn is_built_in(&self) -> bool {
        self.category == TemplateCategory::BuiltIn
    }

    /// Build the polygon this template describes.
    pub fn reconstruct(&self) -> Result<ReconstructedShape, PlanError> {
        reconstruct(&self.dimensions, self.area)
    }
}

/// Fields for a new user template.
#[derive(Debug, Clone, Default)]
pub struct NewTemplate {
    pub name: String,
    pub description: String,
    pub dimensions: Vec<f64>,
    pub area: Option<f64>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub dimensions: Option<Vec<f64>>,
    pub area: Option<f64>,
}

fn built_in(id: &str, name: &str, description: &str, dimensions: &[f64]) -> ShapeTemplate {
    ShapeTemplate {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category: TemplateCategory::BuiltIn,
        dimensions: dimensions.to_vec(),
        edge_count: dimensions.len(),
        area: None,
        created_at: DateTime::<Utc>::default(),
        updated_at: DateTime::<Utc>::default(),
    }
}

/// Shapes shipped with the library.
pub fn built_in_templates() -> Vec<ShapeTemplate> {
    vec![
        built_in("builtin-rect-20x30", "Standard lot", "20 × 30 m rectangle", &[20.0, 30.0, 20.0, 30.0]),
        built_in("builtin-rect-15x40", "Narrow lot", "15 × 40 m rectangle", &[15.0, 40.0, 15.0, 40.0]),
        built_in("builtin-square-25", "Square lot", "25 m square", &[25.0, 25.0, 25.0, 25.0]),
        built_in("builtin-triangle-30-40-50", "Corner wedge", "Right triangle, 30-40-50 m", &[30.0, 40.0, 50.0]),
        built_in("builtin-pentagon-20", "Pentagon", "Regular pentagon, 20 m sides", &[20.0; 5]),
    ]
}

fn check_name(name: &str) -> Result<(), PlanError> {
    if name.trim().is_empty() {
        return Err(PlanError::InvalidTemplate("name must not be empty".into()));
    }
    Ok(())
}

fn check_area(area: Option<f64>) -> Result<(), PlanError> {
    match area {
        Some(a) if !(a.is_finite() && a > 0.0) => {
            Err(PlanError::InvalidTemplate(format!("area must be positive, got {}", a)))
        }
        _ => Ok(()),
    }
}

/// CRUD over built-in and user templates.
pub struct TemplateStore<S> {
    store: S,
}

impl<S: KeyValueStore> TemplateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn load_user(&self) -> Result<Vec<ShapeTemplate>, PlanError> {
        match self.store.get(STORAGE_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save_user(&mut self, templates: &[ShapeTemplate]) -> Result<(), PlanError> {
        let json = serde_json::to_string_pretty(templates)?;
        self.store.set(STORAGE_KEY, &json)
    }

    /// Built-ins first, then user templates in creation order.
    pub fn list(&self) -> Result<Vec<ShapeTemplate>, PlanError> {
        let mut all = built_in_templates();
        all.extend(self.load_user()?);
        Ok(all)
    }

    pub fn get(&self, id: &str) -> Result<ShapeTemplate, PlanError> {
        self.list()?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| PlanError::TemplateNotFound(id.to_string()))
    }

    pub fn create(&mut self, new: NewTemplate) -> Result<ShapeTemplate, PlanError> {
        check_name(&new.name)?;
        validate_dimensions(&new.dimensions)?;
        check_area(new.area)?;

        let now = Utc::now();
        let template = ShapeTemplate {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            description: new.description,
            category: TemplateCategory::User,
            edge_count: new.dimensions.len(),
            dimensions: new.dimensions,
            area: new.area,
            created_at: now,
            updated_at: now,
        };
        let mut user = self.load_user()?;
        user.push(template.clone());
        self.save_user(&user)?;
        log::info!("created template {} ({})", template.name, template.id);
        Ok(template)
    }

    pub fn update(&mut self, id: &str, update: TemplateUpdate) -> Result<ShapeTemplate, PlanError> {
        if built_in_templates().iter().any(|t| t.id == id) {
            return Err(PlanError::BuiltInTemplate(id.to_string()));
        }
        let mut user = self.load_user()?;
        let template = user
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| PlanError::TemplateNotFound(id.to_string()))?;

        if let Some(name) = &update.name {
            check_name(name)?;
        }
        if let Some(dims) = &update.dimensions {
            validate_dimensions(dims)?;
        }
        check_area(update.area)?;

        if let Some(name) = update.name {
            template.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            template.description = description;
        }
        if let Some(dims) = update.dimensions {
            template.edge_count = dims.len();
            template.dimensions = dims;
        }
        if update.area.is_some() {
            template.area = update.area;
        }
        template.updated_at = Utc::now();

        let updated = template.clone();
        self.save_user(&user)?;
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), PlanError> {
        if built_in_templates().iter().any(|t| t.id == id) {
            return Err(PlanError::BuiltInTemplate(id.to_string()));
        }
        let mut user = self.load_user()?;
        let before = user.len();
        user.retain(|t| t.id != id);
        if user.len() == before {
            return Err(PlanError::TemplateNotFound(id.to_string()));
        }
        self.save_user(&user)
    }

    /// User templates as a pretty JSON array.
    pub fn export_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(&self.load_user()?)?)
    }

    /// Add templates from an exported JSON array. Each gets a fresh id and
    /// the user category; invalid entries are skipped. Returns how many
    /// were added.
    pub fn import_json(&mut self, json: &str) -> Result<usize, PlanError> {
        let incoming: Vec<ShapeTemplate> = serde_json::from_str(json)?;
        let mut user = self.load_user()?;
        let now = Utc::now();
        let mut count = 0;

        for mut t in incoming {
            let valid = check_name(&t.name)
                .and_then(|_| validate_dimensions(&t.dimensions))
                .and_then(|_| check_area(t.area));
            if let Err(e) = valid {
                log::warn!("skipping template '{}': {}", t.name, e);
                continue;
            }
            t.id = Uuid::new_v4().to_string();
            t.category = TemplateCategory::User;
            t.edge_count = t.dimensions.len();
            t.updated_at = now;
            user.push(t);
            count += 1;
        }

        if count > 0 {
            self.save_user(&user)?;
        }
        log::info!("imported {} template(s)", count);
        Ok(count)
    }
}
