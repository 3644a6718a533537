use std::error::Error;
use std::fs;
use std::path::Path;
use yaml_rust2::{Yaml, YamlLoader};

const INCLUDE_DIRECTIVE: &str = "!include";

/// Loads a YAML file, resolving `!include <relative path>` lines first.
///
/// Included documents are merged in the order they appear, then the
/// remaining content of the file is merged on top, so local keys override
/// included ones. Includes are resolved relative to the including file.
pub fn load_yaml_with_includes(path: &Path) -> Result<Yaml, Box<dyn Error>> {
    let yaml = process_includes_recursive(path, 0)?;
    tracing::debug!("Resolved config includes for {:?}", path);
    Ok(yaml)
}

fn process_includes_recursive(path: &Path, depth: usize) -> Result<Yaml, Box<dyn Error>> {
    if depth > 16 {
        return Err(format!("Include depth exceeded at {:?}", path).into());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    let base_path = path.parent().unwrap_or(Path::new(""));

    let (includes, rest): (Vec<&str>, Vec<&str>) = contents
        .lines()
        .partition(|&line| line.trim().starts_with(INCLUDE_DIRECTIVE));

    let mut merged: Option<Yaml> = None;
    for line in includes {
        let include_path = line.trim().trim_start_matches(INCLUDE_DIRECTIVE).trim();
        let included = process_includes_recursive(&base_path.join(include_path), depth + 1)?;
        merged = Some(match merged {
            Some(acc) => merge_yaml(&acc, &included),
            None => included,
        });
    }

    for document in YamlLoader::load_from_str(&rest.join("\n"))? {
        merged = Some(match merged {
            Some(acc) => merge_yaml(&acc, &document),
            None => document,
        });
    }

    merged.ok_or_else(|| format!("Empty config file {:?}", path).into())
}

fn merge_yaml(base: &Yaml, override_yaml: &Yaml) -> Yaml {
    match (base, override_yaml) {
        (Yaml::Hash(base_hash), Yaml::Hash(override_hash)) => {
            let mut result = base_hash.clone();
            for (key, value) in override_hash {
                let merged = match base_hash.get(key) {
                    Some(base_value) => merge_yaml(base_value, value),
                    None => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Yaml::Hash(result)
        }
        (_, override_value) => override_value.clone(),
    }
}
