//! TOML configuration file parsing
//!
//! The file has a required `[default]` section holding the run and grid
//! options and an optional `[model]` section describing the external model
//! command. Options are read one by one so that every failure names the
//! option, section and file involved.

use super::{expand_path, parse_start_time, ModelConfig};
use crate::error::ConfigurationError;
use crate::grid::Decomposition;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

/// Section holding the required options
pub const DEFAULT_SECTION: &str = "default";

/// Section describing the model command
pub const MODEL_SECTION: &str = "model";

/// Parsed but unvalidated configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub start_time: NaiveDateTime,
    pub gridx: i64,
    pub gridy: i64,
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub work_directory: PathBuf,
    pub template_directory: PathBuf,
    pub input_file_pattern: Option<String>,
    pub decomposition: Decomposition,
    pub model: Option<ModelConfig>,
}

/// Parse a TOML configuration file
pub fn parse_config_file(path: &Path) -> Result<ConfigFile, ConfigurationError> {
    let contents = fs::read_to_string(path).map_err(|_| {
        ConfigurationError(format!(
            "The configuration file \"{}\" does not exist or is not readable.",
            path.display()
        ))
    })?;
    parse_config_str(&contents, path)
}

/// Parse TOML configuration from a string
///
/// `path` is only used in error messages.
pub fn parse_config_str(contents: &str, path: &Path) -> Result<ConfigFile, ConfigurationError> {
    let table: ::toml::Table = contents.parse().map_err(|e: ::toml::de::Error| {
        ConfigurationError(format!(
            "Failed to parse configuration file \"{}\": {}",
            path.display(),
            e.message()
        ))
    })?;

    let section = Section::new(&table, DEFAULT_SECTION, path)?;

    let start_time_value = section.required("start_time")?;
    let start_time = match start_time_value {
        ::toml::Value::String(s) => parse_start_time(s),
        ::toml::Value::Datetime(d) => parse_start_time(&d.to_string()),
        _ => None,
    }
    .ok_or_else(|| conversion_error("start_time", "datetime"))?;

    let decomposition = match section.optional("decomposition") {
        None => Decomposition::default(),
        Some(value) => value
            .clone()
            .try_into::<Decomposition>()
            .map_err(|_| conversion_error("decomposition", "rows | cells"))?,
    };

    let input_file_pattern = match section.optional("input_file_pattern") {
        None => None,
        Some(::toml::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(conversion_error("input_file_pattern", "string")),
    };

    let model = match table.get(MODEL_SECTION) {
        None => None,
        Some(value) => Some(value.clone().try_into::<ModelConfig>().map_err(|e| {
            ConfigurationError(format!(
                "Invalid section \"[{}]\" in file \"{}\": {}",
                MODEL_SECTION,
                path.display(),
                e.message()
            ))
        })?),
    };

    Ok(ConfigFile {
        path: path.to_path_buf(),
        start_time,
        gridx: section.integer("gridx")?,
        gridy: section.integer("gridy")?,
        input_directory: section.path("input_directory")?,
        output_directory: section.path("output_directory")?,
        work_directory: section.path("work_directory")?,
        template_directory: section.path("template_directory")?,
        input_file_pattern,
        decomposition,
        model,
    })
}

fn conversion_error(option: &str, type_name: &str) -> ConfigurationError {
    ConfigurationError(format!(
        "Cannot convert option \"{}\" to the required type \"{}\"",
        option, type_name
    ))
}

/// One table of the configuration file
struct Section<'a> {
    table: &'a ::toml::Table,
    name: &'a str,
    path: &'a Path,
}

impl<'a> Section<'a> {
    fn new(
        root: &'a ::toml::Table,
        name: &'a str,
        path: &'a Path,
    ) -> Result<Self, ConfigurationError> {
        match root.get(name) {
            Some(::toml::Value::Table(table)) => Ok(Self { table, name, path }),
            _ => Err(ConfigurationError(format!(
                "Missing section \"[{}]\" in configuration file \"{}\"",
                name,
                path.display()
            ))),
        }
    }

    fn optional(&self, option: &str) -> Option<&'a ::toml::Value> {
        self.table.get(option)
    }

    fn required(&self, option: &str) -> Result<&'a ::toml::Value, ConfigurationError> {
        self.table.get(option).ok_or_else(|| {
            ConfigurationError(format!(
                "Configuration option \"{}\" is missing from section \"[{}]\" in file \"{}\".",
                option,
                self.name,
                self.path.display()
            ))
        })
    }

    fn integer(&self, option: &str) -> Result<i64, ConfigurationError> {
        match self.required(option)? {
            ::toml::Value::Integer(i) => Ok(*i),
            // Accept quoted integers, as INI-style files always quote
            ::toml::Value::String(s) => {
                s.trim().parse().map_err(|_| conversion_error(option, "integer"))
            }
            _ => Err(conversion_error(option, "integer")),
        }
    }

    fn path(&self, option: &str) -> Result<PathBuf, ConfigurationError> {
        match self.required(option)? {
            ::toml::Value::String(s) => Ok(expand_path(s)),
            _ => Err(conversion_error(option, "path")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const FULL: &str = r#"
[default]
start_time = "2016-01-01T00:00:00"
gridx = 4
gridy = 5
input_directory = "/data/in"
output_directory = "/data/out"
work_directory = "/tmp/work"
template_directory = "/data/template"
input_file_pattern = "forcing.{time}.nc"
decomposition = "cells"

[model]
command = ["./model", "-n", "namelist"]
outputs = ["output.txt"]
"#;

    fn parse(contents: &str) -> Result<ConfigFile, ConfigurationError> {
        parse_config_str(contents, Path::new("test.toml"))
    }

    #[test]
    fn test_parse_full_file() {
        let file = parse(FULL).unwrap();
        assert_eq!(
            file.start_time,
            NaiveDate::from_ymd_opt(2016, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(file.gridx, 4);
        assert_eq!(file.gridy, 5);
        assert_eq!(file.input_directory, PathBuf::from("/data/in"));
        assert_eq!(file.template_directory, PathBuf::from("/data/template"));
        assert_eq!(file.input_file_pattern.as_deref(), Some("forcing.{time}.nc"));
        assert_eq!(file.decomposition, Decomposition::Cells);

        let model = file.model.unwrap();
        assert_eq!(model.command, vec!["./model", "-n", "namelist"]);
        assert_eq!(model.outputs, vec!["output.txt"]);
        assert!(!model.keep_run_directories);
    }

    #[test]
    fn test_defaults_for_optional_options() {
        let contents = FULL
            .replace("decomposition = \"cells\"\n", "")
            .replace("input_file_pattern = \"forcing.{time}.nc\"\n", "");
        let contents = match contents.find("[model]") {
            Some(pos) => contents[..pos].to_string(),
            None => contents,
        };
        let file = parse(&contents).unwrap();
        assert_eq!(file.decomposition, Decomposition::Rows);
        assert!(file.input_file_pattern.is_none());
        assert!(file.model.is_none());
    }

    #[test]
    fn test_native_toml_datetime() {
        let contents = FULL.replace("\"2016-01-01T00:00:00\"", "2016-01-01T06:30:00");
        let file = parse(&contents).unwrap();
        assert_eq!(
            file.start_time,
            NaiveDate::from_ymd_opt(2016, 1, 1).unwrap().and_hms_opt(6, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_section() {
        let err = parse("[other]\ngridx = 1\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing section \"[default]\" in configuration file \"test.toml\""
        );
    }

    #[test]
    fn test_missing_option() {
        let contents = FULL.replace("gridy = 5\n", "");
        let err = parse(&contents).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration option \"gridy\" is missing from section \"[default]\" \
             in file \"test.toml\"."
        );
    }

    #[test]
    fn test_conversion_errors() {
        let err = parse(&FULL.replace("gridx = 4", "gridx = \"four\"")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot convert option \"gridx\" to the required type \"integer\""
        );

        let err = parse(&FULL.replace("\"2016-01-01T00:00:00\"", "\"yesterday\"")).unwrap_err();
        assert!(err.to_string().contains("\"start_time\""));

        let err = parse(&FULL.replace("\"cells\"", "\"columns\"")).unwrap_err();
        assert!(err.to_string().contains("\"decomposition\""));

        let err = parse(&FULL.replace("work_directory = \"/tmp/work\"", "work_directory = 3"))
            .unwrap_err();
        assert!(err.to_string().contains("\"work_directory\""));
    }

    #[test]
    fn test_quoted_integer_accepted() {
        let file = parse(&FULL.replace("gridx = 4", "gridx = \"4\"")).unwrap();
        assert_eq!(file.gridx, 4);
    }

    #[test]
    fn test_invalid_model_section() {
        let model_command = "command = [\"./model\", \"-n\", \"namelist\"]";
        let err = parse(&FULL.replace(model_command, "command = 7")).unwrap_err();
        assert!(err.to_string().starts_with("Invalid section \"[model]\""));
    }

    #[test]
    fn test_syntax_error() {
        let err = parse("[default\n").unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse configuration file \"test.toml\""));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_config_file(Path::new("/nonexistent/scmtiles.toml")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The configuration file \"/nonexistent/scmtiles.toml\" does not exist \
             or is not readable."
        );
    }
}
