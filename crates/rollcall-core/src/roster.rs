//! Classes and students, persisted as one versioned JSON blob.
//!
//! The current layout is `{"version": 2, "classes": [...], "students": [...]}`.
//! A bare JSON array of students is the unversioned legacy layout and is
//! migrated on read.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::{KeyValueStore, StorageError};
use crate::types::Identity;

/// Storage key the roster lives under.
pub const ROSTER_STORAGE_KEY: &str = "students";
pub const ROSTER_RECORD_VERSION: u64 = 2;

/// Sample class used by `seed_demo`: (name, roll number, photo).
const DEMO_CLASS: &str = "12th-B";
const DEMO_STUDENTS: [(&str, &str, &str); 4] = [
    ("Aaditya Kumar", "101", "faces/Aaditya_kumar.jpg"),
    ("Ashri Singh", "102", "faces/Ashri_singh.jpg"),
    ("Shilpi", "103", "faces/Shilpi.jpg"),
    ("Rohan Verma", "104", "faces/rohan_verma.jpg"),
];

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("class already exists: {0}")]
    DuplicateClass(String),
    #[error("unknown class: {0}")]
    UnknownClass(String),
    #[error("student already exists: {0}")]
    DuplicateStudent(String),
    #[error("unknown student: {0}")]
    UnknownStudent(String),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(rename = "photoUrl")]
    pub photo: String,
}

impl Student {
    pub fn new(
        name: impl Into<String>,
        roll_no: impl Into<String>,
        photo: impl Into<String>,
        class_name: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            roll_no: roll_no.into(),
            class_name,
            photo: photo.into(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.name.clone(), self.photo.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    classes: Vec<String>,
    students: Vec<Student>,
}

impl Roster {
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn student(&self, name: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.name == name)
    }

    pub fn students_in<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a Student> + 'a {
        self.students
            .iter()
            .filter(move |s| s.class_name.as_deref() == Some(class))
    }

    /// Capture roster in roster order, optionally limited to one class.
    pub fn identities(&self, class: Option<&str>) -> Vec<Identity> {
        self.students
            .iter()
            .filter(|s| class.map_or(true, |c| s.class_name.as_deref() == Some(c)))
            .map(Student::identity)
            .collect()
    }

    pub fn add_class(&mut self, name: &str) -> Result<(), RosterError> {
        let name = non_empty(name, "class name")?;
        if self.has_class(&name) {
            return Err(RosterError::DuplicateClass(name));
        }
        self.classes.push(name);
        Ok(())
    }

    /// Remove a class; its students become unassigned.
    pub fn remove_class(&mut self, name: &str) -> Result<(), RosterError> {
        let name = non_empty(name, "class name")?;
        let before = self.classes.len();
        self.classes.retain(|c| *c != name);
        if self.classes.len() == before {
            return Err(RosterError::UnknownClass(name));
        }
        for student in self.students.iter_mut() {
            if student.class_name.as_deref() == Some(name.as_str()) {
                student.class_name = None;
            }
        }
        Ok(())
    }

    /// Add a student. A class name the roster does not know yet is created.
    pub fn add_student(&mut self, mut student: Student) -> Result<(), RosterError> {
        student.name = non_empty(&student.name, "student name")?;
        student.roll_no = non_empty(&student.roll_no, "roll number")?;
        student.photo = non_empty(&student.photo, "photo")?;
        student.class_name = normalize_class(student.class_name);

        if self.student(&student.name).is_some() {
            return Err(RosterError::DuplicateStudent(student.name));
        }
        if let Some(class) = &student.class_name {
            if !self.has_class(class) {
                self.classes.push(class.clone());
            }
        }
        self.students.push(student);
        Ok(())
    }

    pub fn remove_student(&mut self, name: &str) -> Result<Student, RosterError> {
        let idx = self
            .students
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RosterError::UnknownStudent(name.to_string()))?;
        Ok(self.students.remove(idx))
    }

    /// Move a student to `class`, or unassign with `None`.
    pub fn assign_student(&mut self, name: &str, class: Option<&str>) -> Result<(), RosterError> {
        let class = normalize_class(class.map(str::to_string));
        if let Some(c) = &class {
            if !self.has_class(c) {
                return Err(RosterError::UnknownClass(c.clone()));
            }
        }
        let student = self
            .students
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| RosterError::UnknownStudent(name.to_string()))?;
        student.class_name = class;
        Ok(())
    }

    fn has_class(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c == name)
    }

    pub fn encode(&self) -> Result<String, StorageError> {
        let record = RosterRecord {
            version: ROSTER_RECORD_VERSION,
            classes: self.classes.clone(),
            students: self.students.clone(),
        };
        Ok(serde_json::to_string(&record)?)
    }

    pub fn decode(text: &str) -> Result<Self, StorageError> {
        let value: Value = serde_json::from_str(text)?;
        let version = match &value {
            Value::Array(_) => None,
            Value::Object(map) => Some(map.get("version").and_then(Value::as_u64)),
            _ => {
                return Err(StorageError::UnrecognizedLayout(
                    "expected an object or an array".into(),
                ))
            }
        };

        match version {
            None => {
                let legacy: Vec<LegacyStudent> = serde_json::from_value(value)?;
                Ok(Self::migrate_legacy(legacy))
            }
            Some(Some(ROSTER_RECORD_VERSION)) => {
                let record: RosterRecord = serde_json::from_value(value)?;
                Ok(Self::from_record(record))
            }
            Some(Some(other)) => Err(StorageError::UnsupportedVersion(other)),
            Some(None) => Err(StorageError::UnrecognizedLayout(
                "object without a numeric version".into(),
            )),
        }
    }

    fn from_record(record: RosterRecord) -> Self {
        let mut roster = Roster::default();
        for class in record.classes {
            if let Some(class) = normalize_class(Some(class)) {
                if !roster.has_class(&class) {
                    roster.classes.push(class);
                }
            }
        }
        for student in record.students {
            roster.insert_loaded(student);
        }
        roster
    }

    fn migrate_legacy(legacy: Vec<LegacyStudent>) -> Self {
        tracing::info!(students = legacy.len(), "migrating unversioned roster record");
        let mut roster = Roster::default();
        for old in legacy {
            let student = Student {
                id: old.id.map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string()),
                name: old.name,
                roll_no: old.roll_no,
                class_name: old.class_name,
                photo: old.photo_url,
            };
            roster.insert_loaded(student);
        }
        roster
    }

    /// Insert a stored student, tolerating what validation would reject.
    fn insert_loaded(&mut self, mut student: Student) {
        if self.student(&student.name).is_some() {
            tracing::warn!(name = %student.name, "duplicate student in stored roster; keeping first");
            return;
        }
        student.class_name = normalize_class(student.class_name);
        if let Some(class) = &student.class_name {
            if !self.has_class(class) {
                self.classes.push(class.clone());
            }
        }
        self.students.push(student);
    }
}

#[derive(Serialize, Deserialize)]
struct RosterRecord {
    version: u64,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    students: Vec<Student>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyStudent {
    #[serde(default)]
    id: Option<serde_json::Number>,
    name: String,
    #[serde(default)]
    roll_no: String,
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    photo_url: String,
}

fn non_empty(value: &str, field: &'static str) -> Result<String, RosterError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RosterError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn normalize_class(class: Option<String>) -> Option<String> {
    class
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Roster plus the store it is written through to.
///
/// Every successful mutation rewrites the whole roster under
/// [`ROSTER_STORAGE_KEY`]. A failed mutation leaves memory and storage as
/// they were.
pub struct RosterManager<S: KeyValueStore> {
    store: S,
    roster: Roster,
}

impl<S: KeyValueStore> RosterManager<S> {
    /// Load the roster. Missing or unreadable records yield an empty roster.
    pub fn load(store: S) -> Self {
        let roster = match store.get(ROSTER_STORAGE_KEY) {
            Ok(Some(text)) => Roster::decode(&text).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "stored roster unreadable; starting empty");
                Roster::default()
            }),
            Ok(None) => Roster::default(),
            Err(e) => {
                tracing::warn!(error = %e, "roster storage unavailable; starting empty");
                Roster::default()
            }
        };
        tracing::debug!(
            classes = roster.classes.len(),
            students = roster.students.len(),
            "roster loaded"
        );
        Self { store, roster }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn add_class(&mut self, name: &str) -> Result<(), RosterError> {
        self.mutate(|r| r.add_class(name))
    }

    pub fn remove_class(&mut self, name: &str) -> Result<(), RosterError> {
        self.mutate(|r| r.remove_class(name))
    }

    pub fn add_student(&mut self, student: Student) -> Result<(), RosterError> {
        self.mutate(|r| r.add_student(student))
    }

    pub fn remove_student(&mut self, name: &str) -> Result<Student, RosterError> {
        self.mutate(|r| r.remove_student(name))
    }

    pub fn assign_student(&mut self, name: &str, class: Option<&str>) -> Result<(), RosterError> {
        self.mutate(|r| r.assign_student(name, class))
    }

    /// Add the sample class and its students, skipping names already on the
    /// roster. Returns how many students were added.
    pub fn seed_demo(&mut self) -> Result<usize, RosterError> {
        let added = self.mutate(|r| {
            let mut added = 0;
            for (name, roll_no, photo) in DEMO_STUDENTS {
                if r.student(name).is_some() {
                    continue;
                }
                r.add_student(Student::new(name, roll_no, photo, Some(DEMO_CLASS.to_string())))?;
                added += 1;
            }
            Ok(added)
        })?;
        tracing::info!(added, class = DEMO_CLASS, "demo roster seeded");
        Ok(added)
    }

    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut Roster) -> Result<T, RosterError>,
    ) -> Result<T, RosterError> {
        let mut next = self.roster.clone();
        let out = op(&mut next)?;
        self.store.set(ROSTER_STORAGE_KEY, &next.encode()?)?;
        self.roster = next;
        Ok(out)
    }
}
