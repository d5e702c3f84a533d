use serde_json::Value;

use crate::actor::Role;
use crate::record::{is_deleted, value_as_i64, Record, IS_DELETED};
use crate::tables::Table;
use crate::validation::{integer, is_valid_cnic, is_valid_email, is_valid_phone, text, ValidationErrors};

pub const MISSING_TABLE_OR_DATA: &str = "Missing table or data object";

const INVALID_EMAIL: &str = "Invalid email format";
const INVALID_CNIC: &str = "Invalid CNIC format (e.g. 42101-1234567-9)";
const INVALID_PHONE: &str = "Invalid phone number (e.g. 03331234567)";
const SHORT_PASSWORD: &str = "Password must be at least 6 characters";

/// Bodies may arrive bare or wrapped as `{"payload": {...}}`.
pub fn unwrap_payload(body: &Value) -> &Value {
    match body.get("payload") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    }
}

/// Non-empty text value
fn present(record: &Record, key: &str) -> Option<String> {
    text(record, key).filter(|s| !s.is_empty())
}

fn positive_id(value: &Value) -> Option<i64> {
    value_as_i64(value).filter(|id| *id > 0)
}

/// Collects errors for one record, prefixing field names inside batches.
struct Sink<'a> {
    errors: &'a mut ValidationErrors,
    prefix: String,
}

impl Sink<'_> {
    fn add(&mut self, field: &str, message: &str) {
        self.errors.add(format!("{}{}", self.prefix, field), message);
    }
}

// =============================================================================
// INSERT
// =============================================================================

/// Split an insert body into its target table and raw `data`.
pub fn parse_insert(body: &Value) -> Result<(Table, &Value), ValidationErrors> {
    let body = unwrap_payload(body);
    let table = body.get("table").and_then(Value::as_str);
    let data = body.get("data").filter(|d| d.is_object() || d.is_array());

    let (Some(table), Some(data)) = (table, data) else {
        return Err(ValidationErrors::message(MISSING_TABLE_OR_DATA));
    };
    let table = table.parse::<Table>().map_err(|_| ValidationErrors::message("Invalid table name"))?;
    Ok((table, data))
}

/// Validate insert `data` (one object or a list) into cleaned rows.
/// An enrollment whose `courseId` is a list becomes one row per course.
pub fn validate_insert(table: Table, data: &Value) -> Result<Vec<Record>, ValidationErrors> {
    let raw: Vec<&Record> = match data {
        Value::Object(record) => vec![record],
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_object().ok_or_else(|| ValidationErrors::message(MISSING_TABLE_OR_DATA)))
            .collect::<Result<_, _>>()?,
        _ => return Err(ValidationErrors::message(MISSING_TABLE_OR_DATA)),
    };

    let mut expanded: Vec<Record> = Vec::with_capacity(raw.len());
    for record in raw {
        match record.get("courseId") {
            Some(Value::Array(course_ids)) if table == Table::Enrollment => {
                if course_ids.is_empty() {
                    let mut single = record.clone();
                    single.remove("courseId");
                    expanded.push(single);
                }
                for course_id in course_ids {
                    let mut single = record.clone();
                    single.insert("courseId".to_string(), course_id.clone());
                    expanded.push(single);
                }
            }
            _ => expanded.push(record.clone()),
        }
    }

    let many = expanded.len() > 1;
    let mut errors = ValidationErrors::new();
    let mut rows = Vec::with_capacity(expanded.len());

    for (index, record) in expanded.iter().enumerate() {
        let prefix = if many { format!("[{}].", index) } else { String::new() };
        let mut sink = Sink { errors: &mut errors, prefix };
        let row = match table {
            Table::Student | Table::Teacher | Table::Admin => account_insert(record, &mut sink),
            Table::Course => course_insert(record, &mut sink),
            Table::Enrollment => enrollment_insert(record, &mut sink),
        };
        rows.push(row);
    }

    errors.into_result(rows)
}

fn account_insert(record: &Record, sink: &mut Sink<'_>) -> Record {
    let mut row = Record::new();

    match present(record, "name").map(|n| n.trim().to_string()) {
        Some(name) if !name.is_empty() => {
            row.insert("name".into(), name.into());
        }
        _ => sink.add("name", "Name is required"),
    }

    match present(record, "email") {
        None => sink.add("email", "Email is required"),
        Some(email) if !is_valid_email(&email) => sink.add("email", INVALID_EMAIL),
        Some(email) => {
            row.insert("email".into(), email.into());
        }
    }

    match present(record, "cnic") {
        None => sink.add("cnic", "CNIC is required"),
        Some(cnic) if !is_valid_cnic(&cnic) => sink.add("cnic", INVALID_CNIC),
        Some(cnic) => {
            row.insert("cnic".into(), cnic.into());
        }
    }

    if let Some(phone) = present(record, "phone") {
        if is_valid_phone(&phone) {
            row.insert("phone".into(), phone.into());
        } else {
            sink.add("phone", INVALID_PHONE);
        }
    }

    if let Some(gender) = present(record, "gender") {
        row.insert("gender".into(), gender.into());
    }

    match present(record, "status").map(|s| s.trim().to_string()) {
        Some(status) if !status.is_empty() => {
            row.insert("status".into(), status.into());
        }
        _ => sink.add("status", "Status is required"),
    }

    match present(record, "password") {
        None => sink.add("password", "Password is required"),
        Some(password) if password.chars().count() < 6 => sink.add("password", SHORT_PASSWORD),
        Some(password) => {
            row.insert("password".into(), password.into());
        }
    }

    row
}

fn course_insert(record: &Record, sink: &mut Sink<'_>) -> Record {
    let mut row = Record::new();

    match present(record, "name").map(|n| n.trim().to_string()) {
        None => sink.add("name", "Course name is required"),
        Some(name) if name.is_empty() => sink.add("name", "Course name is required"),
        Some(name) if name.chars().count() < 3 => sink.add("name", "Course name must be at least 3 characters"),
        Some(name) if name.chars().count() > 50 => sink.add("name", "Course name too long"),
        Some(name) => {
            row.insert("name".into(), name.into());
        }
    }

    match integer(record, "teacherId") {
        Ok(Some(id)) => {
            row.insert("teacherId".into(), id.into());
        }
        Ok(None) => sink.add("teacherId", "Teacher is required"),
        Err(()) => sink.add("teacherId", "Teacher ID must be numeric"),
    }

    match integer(record, "credit_hours") {
        Ok(Some(hours)) if (1..=3).contains(&hours) => {
            row.insert("credit_hours".into(), hours.into());
        }
        Ok(None) => sink.add("credit_hours", "Credit hours are required"),
        _ => sink.add("credit_hours", "Invalid credit hours"),
    }

    if record.contains_key(IS_DELETED) {
        row.insert(IS_DELETED.into(), is_deleted(record).into());
    }

    row
}

fn enrollment_insert(record: &Record, sink: &mut Sink<'_>) -> Record {
    let mut row = Record::new();

    match integer(record, "courseId") {
        Ok(Some(id)) => {
            row.insert("courseId".into(), id.into());
        }
        Ok(None) => sink.add("courseId", "Course ID is required"),
        Err(()) => sink.add("courseId", "Course ID must be numeric"),
    }

    match integer(record, "studentId") {
        Ok(Some(id)) => {
            row.insert("studentId".into(), id.into());
        }
        Ok(None) => {}
        Err(()) => sink.add("studentId", "Student ID must be numeric"),
    }

    row
}

// =============================================================================
// UPDATE
// =============================================================================

/// Validated partial update. Password fields are kept apart from the column
/// changes so they never reach storage as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRequest {
    pub changes: Record,
    pub new_password: Option<String>,
    pub current_password: Option<String>,
}

/// Split an update body into its target table and raw `data`.
pub fn parse_update(body: &Value) -> Result<(Table, Record), ValidationErrors> {
    let body = unwrap_payload(body);
    let table = body
        .get("type")
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<Table>().ok())
        .ok_or_else(|| ValidationErrors::message("Invalid type"))?;

    let data = match body.get("data") {
        None | Some(Value::Null) => Record::new(),
        Some(Value::Object(data)) => data.clone(),
        Some(_) => return Err(ValidationErrors::message("Invalid data")),
    };
    Ok((table, data))
}

pub fn validate_path_id(raw: &str) -> Result<i64, ValidationErrors> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ValidationErrors::message("Invalid ID"))
}

pub fn validate_update(table: Table, data: &Record) -> Result<UpdateRequest, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut sink = Sink { errors: &mut errors, prefix: String::new() };
    let mut request = UpdateRequest::default();

    match table {
        Table::Student | Table::Teacher => {
            account_update(data, &mut request.changes, &mut sink, true);
            password_fields(data, &mut request, &mut sink);
        }
        Table::Admin => {
            account_update(data, &mut request.changes, &mut sink, false);
            password_fields(data, &mut request, &mut sink);
        }
        Table::Course => course_update(data, &mut request.changes, &mut sink),
        Table::Enrollment => {
            if !data.is_empty() {
                sink.add("data", "Enrollments cannot be updated");
            }
        }
    }

    errors.into_result(request)
}

fn account_update(data: &Record, changes: &mut Record, sink: &mut Sink<'_>, full: bool) {
    if let Some(name) = text(data, "name") {
        let name = name.trim().to_string();
        if name.is_empty() {
            sink.add("name", "Name cannot be empty");
        } else {
            changes.insert("name".into(), name.into());
        }
    }

    if let Some(email) = text(data, "email") {
        if is_valid_email(&email) {
            changes.insert("email".into(), email.into());
        } else {
            sink.add("email", INVALID_EMAIL);
        }
    }

    if !full {
        return;
    }

    if let Some(cnic) = text(data, "cnic") {
        if is_valid_cnic(&cnic) {
            changes.insert("cnic".into(), cnic.into());
        } else {
            sink.add("cnic", INVALID_CNIC);
        }
    }

    match data.get("phone") {
        None => {}
        Some(Value::Null) => {
            changes.insert("phone".into(), Value::Null);
        }
        Some(_) => match text(data, "phone") {
            Some(phone) if phone.is_empty() => {
                changes.insert("phone".into(), Value::Null);
            }
            Some(phone) if is_valid_phone(&phone) => {
                changes.insert("phone".into(), phone.into());
            }
            _ => sink.add("phone", INVALID_PHONE),
        },
    }

    if let Some(status) = text(data, "status") {
        let status = status.trim().to_string();
        if status.is_empty() {
            sink.add("status", "Status cannot be empty");
        } else {
            changes.insert("status".into(), status.into());
        }
    }

    match data.get("gender") {
        Some(Value::Null) => {
            changes.insert("gender".into(), Value::Null);
        }
        Some(_) => {
            if let Some(gender) = text(data, "gender") {
                changes.insert("gender".into(), gender.into());
            }
        }
        None => {}
    }
}

fn password_fields(data: &Record, request: &mut UpdateRequest, sink: &mut Sink<'_>) {
    if let Some(new_password) = present(data, "newPassword") {
        if new_password.chars().count() < 6 {
            sink.add("newPassword", SHORT_PASSWORD);
        } else {
            request.new_password = Some(new_password);
        }
    }
    request.current_password = present(data, "currentPassword");
}

fn course_update(data: &Record, changes: &mut Record, sink: &mut Sink<'_>) {
    if let Some(name) = text(data, "name") {
        let name = name.trim().to_string();
        let len = name.chars().count();
        if len < 3 {
            sink.add("name", "Course name must be at least 3 characters");
        } else if len > 50 {
            sink.add("name", "Course name too long");
        } else {
            changes.insert("name".into(), name.into());
        }
    }

    match integer(data, "credit_hours") {
        Ok(Some(hours)) if (1..=3).contains(&hours) => {
            changes.insert("credit_hours".into(), hours.into());
        }
        Ok(None) => {}
        _ => sink.add("credit_hours", "Invalid credit hours"),
    }

    match integer(data, "teacherId") {
        Ok(Some(id)) => {
            changes.insert("teacherId".into(), id.into());
        }
        Ok(None) => {}
        Err(()) => sink.add("teacherId", "Teacher ID must be numeric"),
    }
}

// =============================================================================
// DELETE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub table: Table,
    /// Distinct, in request order
    pub ids: Vec<i64>,
}

/// Ids may come from body `ids`, body `id` and the path; all are merged.
pub fn validate_delete(body: &Value, path_id: Option<&str>) -> Result<DeleteRequest, ValidationErrors> {
    let body = unwrap_payload(body);
    let mut errors = ValidationErrors::new();

    let table = match body.get("type").and_then(Value::as_str) {
        None => {
            errors.add("type", "Type is required");
            None
        }
        Some(raw) => match raw.parse::<Table>() {
            Ok(table) => Some(table),
            Err(_) => {
                errors.add("type", "Invalid table type");
                None
            }
        },
    };

    let mut ids: Vec<i64> = Vec::new();
    match body.get("ids") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) if items.is_empty() => errors.add("ids", "At least one ID is required"),
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                match positive_id(item) {
                    Some(id) => ids.push(id),
                    None => errors.add(format!("ids[{}]", index), "Invalid ID"),
                }
            }
        }
        Some(_) => errors.add("ids", "IDs must be an array"),
    }

    match body.get("id") {
        None | Some(Value::Null) => {}
        Some(value) => match positive_id(value) {
            Some(id) => ids.push(id),
            None => errors.add("id", "Invalid ID"),
        },
    }

    if let Some(raw) = path_id {
        match validate_path_id(raw) {
            Ok(id) => ids.push(id),
            Err(_) => errors.add("id", "Invalid ID"),
        }
    }

    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));

    if errors.is_empty() && ids.is_empty() {
        errors.add("ids", "At least one ID is required");
    }

    match table {
        Some(table) if errors.is_empty() => Ok(DeleteRequest { table, ids }),
        _ => Err(errors),
    }
}

// =============================================================================
// AUTH
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn email_and_password(record: &Record, sink: &mut Sink<'_>) -> (String, String) {
    let email = match present(record, "email").map(|e| e.trim().to_string()) {
        None => {
            sink.add("email", "Email is required");
            String::new()
        }
        Some(email) if !is_valid_email(&email) => {
            sink.add("email", INVALID_EMAIL);
            String::new()
        }
        Some(email) => email,
    };

    let password = match present(record, "password") {
        None => {
            sink.add("password", "Password is required");
            String::new()
        }
        Some(password) if password.chars().count() < 6 => {
            sink.add("password", SHORT_PASSWORD);
            String::new()
        }
        Some(password) => password,
    };

    (email, password)
}

pub fn validate_login(body: &Value) -> Result<LoginRequest, ValidationErrors> {
    let empty = Record::new();
    let record = unwrap_payload(body).as_object().unwrap_or(&empty);

    let mut errors = ValidationErrors::new();
    let mut sink = Sink { errors: &mut errors, prefix: String::new() };
    let (email, password) = email_and_password(record, &mut sink);
    errors.into_result(LoginRequest { email, password })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub user_type: Role,
    pub name: String,
    pub email: String,
    pub password: String,
}

pub fn validate_register(body: &Value) -> Result<RegisterRequest, ValidationErrors> {
    let empty = Record::new();
    let record = unwrap_payload(body).as_object().unwrap_or(&empty);

    let mut errors = ValidationErrors::new();
    let mut sink = Sink { errors: &mut errors, prefix: String::new() };

    let user_type = match present(record, "type") {
        None => {
            sink.add("type", "User type is required");
            None
        }
        Some(raw) => {
            let parsed = raw.parse::<Role>().ok();
            if parsed.is_none() {
                sink.add("type", "Invalid user type");
            }
            parsed
        }
    };

    let name = match present(record, "name").map(|n| n.trim().to_string()) {
        Some(name) if name.is_empty() => {
            sink.add("name", "Name is required");
            name
        }
        Some(name) if name.chars().count() < 2 => {
            sink.add("name", "Name must be at least 2 characters");
            name
        }
        Some(name) if name.chars().count() > 50 => {
            sink.add("name", "Name too long");
            name
        }
        Some(name) => name,
        None => {
            sink.add("name", "Name is required");
            String::new()
        }
    };

    let (email, password) = email_and_password(record, &mut sink);

    match user_type {
        Some(user_type) if errors.is_empty() => Ok(RegisterRequest { user_type, name, email, password }),
        _ => Err(errors),
    }
}
