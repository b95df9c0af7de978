use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const SETTINGS_SCHEMA_VERSION: i64 = 1;
const SETTINGS_DIR: &str = ".debtledger";

/// SonarQube caps any single issue query at this many results.
pub const SONAR_RESULT_CAP: u64 = 10_000;
pub const MAX_PAGE_SIZE: u64 = 500;

const ISSUE_TYPES: &[&str] = &["CODE_SMELL", "BUG", "VULNERABILITY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub url: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    /// Server holding the full analysis history of every project.
    pub history: ServerSettings,
    /// Server where each project version was analyzed on its own.
    pub single: ServerSettings,
    pub page_size: u32,
    pub result_cap: u64,
    pub timeout_secs: u64,
    pub languages: Vec<String>,
    pub issue_types: Vec<String>,
    pub project_measures: Vec<String>,
    /// Application → versions analyzed on the single-version server.
    pub projects: BTreeMap<String, Vec<String>>,
    pub export_path: PathBuf,
}

pub fn load_effective_settings(workspace_path: &str) -> Result<EffectiveSettings, String> {
    let settings = load_settings_from_disk(workspace_path)?;
    Ok(effective_from_value(workspace_path, &settings))
}

pub fn effective_from_value(workspace_path: &str, settings: &Value) -> EffectiveSettings {
    let text = |key: &str, default: &str| {
        settings
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };
    let list = |key: &str| -> Vec<String> {
        settings
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut projects = BTreeMap::new();
    if let Some(obj) = settings.get("projects").and_then(Value::as_object) {
        for (app, versions) in obj {
            let versions = versions
                .as_array()
                .map(|v| v.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            projects.insert(app.clone(), versions);
        }
    }

    EffectiveSettings {
        history: ServerSettings {
            url: text("historyServerUrl", "http://localhost:9000"),
            user: text("historyUser", "admin"),
            password: text("historyPassword", "admin"),
        },
        single: ServerSettings {
            url: text("singleServerUrl", "http://localhost:9100"),
            user: text("singleUser", "admin"),
            password: text("singlePassword", "admin"),
        },
        page_size: settings
            .get("pageSize")
            .and_then(Value::as_u64)
            .unwrap_or(MAX_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE) as u32,
        result_cap: settings
            .get("resultCap")
            .and_then(Value::as_u64)
            .unwrap_or(SONAR_RESULT_CAP)
            .clamp(1, SONAR_RESULT_CAP),
        timeout_secs: settings
            .get("requestTimeoutSecs")
            .and_then(Value::as_u64)
            .unwrap_or(60),
        languages: list("languages"),
        issue_types: list("issueTypes"),
        project_measures: list("projectMeasures"),
        projects,
        export_path: Path::new(workspace_path)
            .join(SETTINGS_DIR)
            .join(text("exportFile", "debtledger.db")),
    }
}

pub fn load_settings_from_disk(workspace_path: &str) -> Result<Value, String> {
    let path = settings_path(workspace_path);
    ensure_settings_dir(workspace_path)?;

    let original = if path.exists() {
        let raw = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings.json: {e}"))?;
        serde_json::from_str::<Value>(&raw).unwrap_or_else(|e| {
            log::warn!("settings.json is not valid JSON ({e}); using defaults");
            json!({})
        })
    } else {
        json!({})
    };

    let migrated = migrate_settings(original.clone());
    if migrated != original || !path.exists() {
        write_settings_file(&path, &migrated)?;
    }

    Ok(migrated)
}

pub fn save_settings_to_disk(workspace_path: &str, settings: Value) -> Result<Value, String> {
    let path = settings_path(workspace_path);
    ensure_settings_dir(workspace_path)?;

    let mut merged = load_settings_from_disk(workspace_path).unwrap_or_else(|_| default_settings());
    merge_settings(&mut merged, &settings);

    let migrated = migrate_settings(merged);
    write_settings_file(&path, &migrated)?;
    Ok(migrated)
}

pub fn settings_path(workspace_path: &str) -> PathBuf {
    Path::new(workspace_path).join(SETTINGS_DIR).join("settings.json")
}

fn ensure_settings_dir(workspace_path: &str) -> Result<(), String> {
    let dir = Path::new(workspace_path).join(SETTINGS_DIR);
    fs::create_dir_all(&dir).map_err(|e| format!("Failed to create {SETTINGS_DIR} directory: {e}"))
}

fn write_settings_file(path: &Path, settings: &Value) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {e}"))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write settings.json: {e}"))
}

fn migrate_settings(input: Value) -> Value {
    let mut out = match input {
        Value::Object(map) => Value::Object(map),
        _ => Value::Object(Map::new()),
    };

    let version = out
        .get("schema_version")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    if version > SETTINGS_SCHEMA_VERSION {
        log::warn!("settings.json schema v{version} is newer than v{SETTINGS_SCHEMA_VERSION}");
    }

    deep_merge_defaults(&mut out, &default_settings());
    sanitize_settings(&mut out);
    if let Some(obj) = out.as_object_mut() {
        obj.insert("schema_version".to_string(), json!(SETTINGS_SCHEMA_VERSION));
    }

    out
}

fn default_settings() -> Value {
    json!({
        "schema_version": SETTINGS_SCHEMA_VERSION,
        "historyServerUrl": "http://localhost:9000",
        "historyUser": "admin",
        "historyPassword": "admin",
        "singleServerUrl": "http://localhost:9100",
        "singleUser": "admin",
        "singlePassword": "admin",
        "pageSize": MAX_PAGE_SIZE,
        "resultCap": SONAR_RESULT_CAP,
        "requestTimeoutSecs": 60,
        "languages": ["java"],
        "issueTypes": ISSUE_TYPES,
        "projectMeasures": [
            "ncloc",
            "classes",
            "statements",
            "functions",
            "development_cost",
            "sqale_debt_ratio",
            "sqale_index"
        ],
        "projects": {},
        "exportFile": "debtledger.db"
    })
}

fn deep_merge_defaults(target: &mut Value, defaults: &Value) {
    let (Some(target_obj), Some(default_obj)) = (target.as_object_mut(), defaults.as_object()) else {
        return;
    };

    for (key, default_value) in default_obj {
        match target_obj.get_mut(key) {
            Some(existing) => {
                if existing.is_object() && default_value.is_object() {
                    deep_merge_defaults(existing, default_value);
                }
            }
            None => {
                target_obj.insert(key.clone(), default_value.clone());
            }
        }
    }
}

fn merge_settings(target: &mut Value, incoming: &Value) {
    match (target, incoming) {
        (Value::Object(target_obj), Value::Object(incoming_obj)) => {
            for (key, value) in incoming_obj {
                if let Some(existing) = target_obj.get_mut(key) {
                    merge_settings(existing, value);
                } else {
                    target_obj.insert(key.clone(), value.clone());
                }
            }
        }
        (target_slot, incoming_value) => {
            *target_slot = incoming_value.clone();
        }
    }
}

fn sanitize_settings(settings: &mut Value) {
    let Some(obj) = settings.as_object_mut() else {
        return;
    };

    clamp_u64(obj, "pageSize", 1, MAX_PAGE_SIZE, MAX_PAGE_SIZE);
    clamp_u64(obj, "resultCap", 1, SONAR_RESULT_CAP, SONAR_RESULT_CAP);
    clamp_u64(obj, "requestTimeoutSecs", 5, 600, 60);

    for key in ["historyServerUrl", "singleServerUrl"] {
        if let Some(url) = obj.get(key).and_then(Value::as_str) {
            let trimmed = url.trim_end_matches('/').to_string();
            obj.insert(key.to_string(), json!(trimmed));
        }
    }

    // Unknown issue types would make the server reject the whole query.
    let types: Vec<Value> = obj
        .get("issueTypes")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|v| v.as_str().is_some_and(|s| ISSUE_TYPES.contains(&s)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    let types = if types.is_empty() { json!(ISSUE_TYPES) } else { Value::Array(types) };
    obj.insert("issueTypes".to_string(), types);

    if !obj.get("projects").is_some_and(Value::is_object) {
        obj.insert("projects".to_string(), json!({}));
    }
}

fn clamp_u64(map: &mut Map<String, Value>, key: &str, min: u64, max: u64, default: u64) {
    let raw = map.get(key).and_then(Value::as_u64).unwrap_or(default);
    map.insert(key.to_string(), json!(raw.clamp(min, max)));
}
