use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostalAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

impl PostalAddress {
    pub fn is_blank(&self) -> bool {
        self.street.is_empty() && self.city.is_empty() && self.state.is_empty() && self.zip_code.is_empty()
    }
}

/// Student addresses arrive either as one free-text line or already split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Address {
    Text(String),
    Structured(PostalAddress),
}

impl Default for Address {
    fn default() -> Self {
        Address::Text(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParentGuardian {
    pub name: String,
    pub relationship: String,
    pub primary_phone: String,
    pub secondary_phone: String,
    pub primary_email: String,
    pub secondary_email: String,
    pub address: PostalAddress,
}

impl Default for ParentGuardian {
    fn default() -> Self {
        Self {
            name: String::new(),
            relationship: "Parent".to_string(),
            primary_phone: String::new(),
            secondary_phone: String::new(),
            primary_email: String::new(),
            secondary_email: String::new(),
            address: PostalAddress::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: String,
    pub address: Address,
    pub emergency_contact: String,
    pub grade_level: String,
    pub enrollment_status: String,
    pub enrollment_date: String,
    pub parent_guardian: ParentGuardian,
    pub communication_history: Vec<Value>,
}

impl Default for StudentRecord {
    fn default() -> Self {
        Self {
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            phone: String::new(),
            date_of_birth: String::new(),
            address: Address::default(),
            emergency_contact: String::new(),
            grade_level: String::new(),
            enrollment_status: "active".to_string(),
            enrollment_date: String::new(),
            parent_guardian: ParentGuardian::default(),
            communication_history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(flatten)]
    pub record: StudentRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseSchedule {
    pub days: Vec<String>,
    pub start_time: String,
    pub end_time: String,
    pub room: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseRecord {
    pub course_name: String,
    pub course_code: String,
    pub teacher: String,
    pub credit_hours: i64,
    pub semester: String,
    pub schedule: CourseSchedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(flatten)]
    pub record: CourseRecord,
    pub enrolled_students: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub student_id: i64,
    pub course_id: i64,
    pub assignment_name: String,
    #[serde(default = "default_category")]
    pub category: String,
    pub points: f64,
    pub max_points: f64,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub letter_grade: String,
    #[serde(default)]
    pub date_recorded: String,
    #[serde(default)]
    pub comments: String,
}

pub fn default_category() -> String {
    "Assignment".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(flatten)]
    pub record: GradeRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [Self::Present, Self::Absent, Self::Late, Self::Excused];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "late" => Some(Self::Late),
            "excused" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "Present",
            Self::Absent => "Absent",
            Self::Late => "Late",
            Self::Excused => "Excused",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: i64,
    pub course_id: i64,
    pub date: String,
    pub status: AttendanceStatus,
    #[serde(default = "default_recorded_by")]
    pub recorded_by: String,
    #[serde(default)]
    pub notes: String,
}

pub fn default_recorded_by() -> String {
    "System".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(flatten)]
    pub record: AttendanceRecord,
}

/// Something that happened in the workspace, shown newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default = "empty_details")]
    pub details: Value,
    #[serde(default)]
    pub timestamp: String,
}

fn empty_details() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ActivityRecord {
    pub fn new(kind: &str, description: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
            entity: None,
            entity_id: None,
            details: empty_details(),
            timestamp: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(flatten)]
    pub record: ActivityRecord,
}
