// Read machine and task configuration from a json file.
//
// The file is an object with three arrays:
//
//   {
//     "machines": [ { ... }, ... ],
//     "rules": [ { ... }, ... ],
//     "tasks": [ { ... }, ... ]
//   }
//
// Each machine object has these fields:
//
//   machine_id - string, unique
//   machine_name - string
//   machine_type - string, eg "XT1900"
//   mount_point - string, directory where the machine's log share is mounted
//   enabled - boolean, optional, default true
//
// Each rule object has these fields:
//
//   rule_id - string, unique
//   plugin_func - string or null, optional, the name of the parser the rule applies (see
//     FileFormat).  Rules without a parser are accepted and ignored.
//
// Each task object has these fields:
//
//   task_id - string, unique
//   machine_id - string, must name a machine in "machines"
//   task_name - string
//   source_path - string, directory to ingest files from; relative paths are relative to the
//     machine's mount_point
//   format - string, the file format, see FileFormat (eg "xt_lusu_tgs")
//   apply_rules - array of rule_id strings, used only if "format" is absent: the format is the
//     plugin_func of the first listed rule that has one
//   enabled - boolean, optional, default true
//
// Other fields are ignored.  A missing array is the same as an empty one.  A parser name that is
// not a known FileFormat is an error, so a configuration naming a parser this library does not
// have (eg "pas_log") is rejected when it is loaded.

use crate::FileFormat;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{self, PathBuf};
use std::str::FromStr;

// See above comment block for field documentation.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub machine_id: String,
    pub machine_name: String,
    pub machine_type: String,
    pub mount_point: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub task_id: String,
    pub machine_id: String,
    pub task_name: String,
    pub source_path: String,
    pub format: FileFormat,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub machines: Vec<Machine>,
    pub tasks: Vec<Task>,
}

impl Config {
    pub fn machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.machine_id == machine_id)
    }

    /// The directory `task` ingests from.

    pub fn task_directory(&self, task: &Task) -> PathBuf {
        let p = PathBuf::from(&task.source_path);
        if p.is_absolute() {
            return p;
        }
        match self.machine(&task.machine_id) {
            Some(m) => PathBuf::from(&m.mount_point).join(p),
            None => p,
        }
    }
}

// Since the input is human-generated and has optional fields, I've opted to use the generic JSON
// parser followed by explicit decoding of the fields, rather than a (derived) strongly-typed
// parser.

pub fn read_from_json(filename: &str) -> Result<Config> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    parse_config(v)
}

/// Decode and validate an already-parsed configuration.

pub fn parse_config(v: Value) -> Result<Config> {
    let Value::Object(top) = v else {
        bail!("Expected an object value")
    };

    let mut config = Config::default();
    let mut machine_ids = HashSet::new();
    for obj in grab_array(&top, "machines")? {
        let Value::Object(fields) = obj else {
            bail!("Expected an object value in 'machines'")
        };
        let machine = Machine {
            machine_id: grab_string(fields, "machine_id")?,
            machine_name: grab_string(fields, "machine_name")?,
            machine_type: grab_string(fields, "machine_type")?,
            mount_point: grab_string(fields, "mount_point")?,
            enabled: grab_bool_or(fields, "enabled", true)?,
        };
        if !machine_ids.insert(machine.machine_id.clone()) {
            bail!("Duplicate machine '{}'", machine.machine_id);
        }
        config.machines.push(machine);
    }

    let mut rules = HashMap::new();
    for obj in grab_array(&top, "rules")? {
        let Value::Object(fields) = obj else {
            bail!("Expected an object value in 'rules'")
        };
        let rule_id = grab_string(fields, "rule_id")?;
        let plugin = match fields.get("plugin_func") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(_) => bail!("Field 'plugin_func' must have a string value"),
        };
        if rules.insert(rule_id.clone(), plugin).is_some() {
            bail!("Duplicate rule '{rule_id}'");
        }
    }

    let mut task_ids = HashSet::new();
    for obj in grab_array(&top, "tasks")? {
        let Value::Object(fields) = obj else {
            bail!("Expected an object value in 'tasks'")
        };
        let task = Task {
            task_id: grab_string(fields, "task_id")?,
            machine_id: grab_string(fields, "machine_id")?,
            task_name: grab_string(fields, "task_name")?,
            source_path: grab_string(fields, "source_path")?,
            format: task_format(fields, &rules)?,
            enabled: grab_bool_or(fields, "enabled", true)?,
        };
        if !machine_ids.contains(&task.machine_id) {
            bail!("Task '{}' names unknown machine '{}'", task.task_id, task.machine_id);
        }
        if !task_ids.insert(task.task_id.clone()) {
            bail!("Duplicate task '{}'", task.task_id);
        }
        config.tasks.push(task);
    }

    Ok(config)
}

// An explicit "format" wins over "apply_rules".

fn task_format(
    fields: &serde_json::Map<String, Value>,
    rules: &HashMap<String, Option<String>>,
) -> Result<FileFormat> {
    if fields.contains_key("format") {
        return FileFormat::from_str(&grab_string(fields, "format")?);
    }
    let Some(Value::Array(rule_ids)) = fields.get("apply_rules") else {
        bail!("Field 'format' or array field 'apply_rules' must be present")
    };
    for rule_id in rule_ids {
        let Value::String(rule_id) = rule_id else {
            bail!("Expected a string value in 'apply_rules'")
        };
        match rules.get(rule_id) {
            Some(Some(plugin)) => return FileFormat::from_str(plugin),
            Some(None) => {}
            None => bail!("Unknown rule '{rule_id}'"),
        }
    }
    bail!("No rule in 'apply_rules' names a parser")
}

fn grab_array<'a>(fields: &'a serde_json::Map<String, Value>, name: &str) -> Result<&'a [Value]> {
    match fields.get(name) {
        Some(Value::Array(vs)) => Ok(vs),
        Some(_) => bail!("Field '{name}' must have an array value"),
        None => Ok(&[]),
    }
}

fn grab_string(fields: &serde_json::Map<String, Value>, name: &str) -> Result<String> {
    if let Some(Value::String(s)) = fields.get(name) {
        Ok(s.clone())
    } else {
        bail!("Field '{name}' must be present and have a string value")
    }
}

fn grab_bool_or(fields: &serde_json::Map<String, Value>, name: &str, default: bool) -> Result<bool> {
    match fields.get(name) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => bail!("Field '{name}' must have a boolean value"),
        None => Ok(default),
    }
}

#[cfg(test)]
use serde_json::json;

#[test]
fn test_parse_config() {
    let c = parse_config(json!({
        "machines": [
            {"machine_id": "XT01", "machine_name": "Litho 1", "machine_type": "XT1900",
             "mount_point": "/mnt/xt01"},
            {"machine_id": "XT02", "machine_name": "Litho 2", "machine_type": "XT1900",
             "mount_point": "/mnt/xt02", "enabled": false}
        ],
        "tasks": [
            {"task_id": "xt01-lusu", "machine_id": "XT01", "task_name": "LUSU",
             "source_path": "LUSU/data", "format": "xt_lusu_tgs"},
            {"task_id": "xt02-lusu", "machine_id": "XT02", "task_name": "LUSU",
             "source_path": "/archive/xt02", "format": "xt_lusu_tgs", "enabled": false,
             "post_processing": {}}
        ]
    }))
    .unwrap();
    assert!(c.machines.len() == 2);
    assert!(c.machines[0].enabled);
    assert!(!c.machines[1].enabled);
    assert!(c.tasks.len() == 2);
    assert!(c.tasks[0].format == FileFormat::XtLusuTgs);
    assert!(!c.tasks[1].enabled);
    assert!(c.task_directory(&c.tasks[0]) == PathBuf::from("/mnt/xt01/LUSU/data"));
    assert!(c.task_directory(&c.tasks[1]) == PathBuf::from("/archive/xt02"));
}

#[test]
fn test_config_errors() {
    let machine = json!({"machine_id": "XT01", "machine_name": "Litho 1",
                         "machine_type": "XT1900", "mount_point": "/mnt/xt01"});

    // Unknown format is caught at load
    assert!(parse_config(json!({
        "machines": [machine.clone()],
        "tasks": [{"task_id": "t", "machine_id": "XT01", "task_name": "PAS",
                   "source_path": "p", "format": "pas_log"}]
    }))
    .is_err());

    // Unknown machine
    assert!(parse_config(json!({
        "machines": [machine.clone()],
        "tasks": [{"task_id": "t", "machine_id": "XT09", "task_name": "LUSU",
                   "source_path": "p", "format": "xt_lusu_tgs"}]
    }))
    .is_err());

    // Missing and mistyped fields
    assert!(parse_config(json!({"machines": [{"machine_id": "XT01"}]})).is_err());
    assert!(parse_config(json!({"machines": [{"machine_id": "XT01", "machine_name": "x",
        "machine_type": "y", "mount_point": "z", "enabled": "yes"}]})).is_err());
    assert!(parse_config(json!({"machines": {}})).is_err());
    assert!(parse_config(json!([])).is_err());

    // Duplicates
    assert!(parse_config(json!({"machines": [machine.clone(), machine]})).is_err());

    // Empty is fine
    assert!(parse_config(json!({})).unwrap() == Config::default());
}

#[test]
fn test_apply_rules() {
    let machine = json!({"machine_id": "XT01", "machine_name": "Litho 1",
                         "machine_type": "XT1900", "mount_point": "/mnt/xt01"});
    let rules = json!([
        {"rule_id": "lusu_tgs", "type": "plugin", "plugin_func": "xt_lusu_tgs"},
        {"rule_id": "pas", "type": "plugin", "plugin_func": "pas_log"},
        {"rule_id": "timestamp_re", "type": "regex", "pattern": "\\d+", "plugin_func": null}
    ]);

    let c = parse_config(json!({
        "machines": [machine.clone()],
        "rules": rules.clone(),
        "tasks": [{"task_id": "t", "machine_id": "XT01", "task_name": "LUSU",
                   "source_path": "LUSU", "apply_rules": ["timestamp_re", "lusu_tgs"],
                   "post_processing": {}}]
    }))
    .unwrap();
    assert!(c.tasks[0].format == FileFormat::XtLusuTgs);

    // "format" wins over "apply_rules"
    let c = parse_config(json!({
        "machines": [machine.clone()],
        "rules": rules.clone(),
        "tasks": [{"task_id": "t", "machine_id": "XT01", "task_name": "LUSU",
                   "source_path": "LUSU", "format": "xt_lusu_tgs", "apply_rules": ["pas"]}]
    }))
    .unwrap();
    assert!(c.tasks[0].format == FileFormat::XtLusuTgs);

    for apply_rules in [json!(["pas"]), json!(["nope"]), json!(["timestamp_re"]), json!([])] {
        assert!(parse_config(json!({
            "machines": [machine.clone()],
            "rules": rules.clone(),
            "tasks": [{"task_id": "t", "machine_id": "XT01", "task_name": "LUSU",
                       "source_path": "LUSU", "apply_rules": apply_rules}]
        }))
        .is_err());
    }

    // Neither field
    assert!(parse_config(json!({
        "machines": [machine.clone()],
        "tasks": [{"task_id": "t", "machine_id": "XT01", "task_name": "LUSU",
                   "source_path": "LUSU"}]
    }))
    .is_err());

    // Duplicate rule
    assert!(parse_config(json!({"rules": [{"rule_id": "a"}, {"rule_id": "a"}]})).is_err());
}
