//! The ambient environment of a translation run: the optional dotenv file,
//! a point-in-time snapshot of the process environment, and the rewriter
//! that moves variable references between the compose grammar and the
//! supervisord interpolation grammar.

use anyhow::Result;
use regex::{Captures, Regex};
use std::{collections::BTreeMap as Map, env, iter::FromIterator, path::Path};

/// Matches both reference forms of the compose grammar: bare `$NAME` bounded
/// by a word boundary, and braced `${NAME}` with an optional `:default`
/// clause. The default clause is matched so the whole reference is consumed,
/// but its value is dropped; the supervisord placeholder syntax cannot carry
/// one.
const ENV_VAR_PATTERN: &str = r"\$([^{}:\s]+)\b|\$\{([^{:\s}]+)(?::[^{:\s}]+)?\}";

/// The supervisord interpolation form for a variable, resolved from the
/// supervisor's own merged environment when it starts the process.
pub fn placeholder(name: &str) -> String {
    format!("%(ENV_{})s", name)
}

pub struct EnvVarRewriter {
    pattern: Regex,
}

impl EnvVarRewriter {
    pub fn new() -> EnvVarRewriter {
        EnvVarRewriter {
            pattern: Regex::new(ENV_VAR_PATTERN).unwrap(),
        }
    }

    /// Rewrites every variable reference into a supervisord placeholder.
    /// Input without references comes back unchanged.
    pub fn deferred(&self, input: &str) -> String {
        self.pattern
            .replace_all(input, |caps: &Captures| placeholder(reference_name(caps)))
            .into_owned()
    }

    /// Resolves every variable reference against the snapshot right now.
    /// Unset variables become the empty string.
    pub fn immediate(&self, input: &str, env: &EnvSnapshot) -> String {
        self.pattern
            .replace_all(input, |caps: &Captures| {
                env.get(reference_name(caps)).unwrap_or("").to_owned()
            })
            .into_owned()
    }
}

fn reference_name<'t>(caps: &'t Captures) -> &'t str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or("")
}

/// The key=value file merged into the supervisor's global environment,
/// in declaration order. A missing file reads as an empty one.
#[derive(Clone, Debug, Default)]
pub struct EnvFile {
    pub pairs: Vec<(String, String)>,
}

impl EnvFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<EnvFile> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(EnvFile::default());
        }

        let mut pairs = Vec::new();
        for item in dotenvy::from_path_iter(path)? {
            pairs.push(item?);
        }

        Ok(EnvFile { pairs })
    }
}

/// The environment immediate substitution resolves against, captured once
/// per run so nothing consults the ambient process state mid-translation.
#[derive(Clone, Debug, Default)]
pub struct EnvSnapshot {
    vars: Map<String, String>,
}

impl EnvSnapshot {
    /// The process environment with the env file merged in. A variable set
    /// in both keeps its process value.
    pub fn capture(env_file: &EnvFile) -> EnvSnapshot {
        let mut vars: Map<String, String> = env::vars().collect();
        for (key, value) in env_file.pairs.iter() {
            vars.entry(key.clone()).or_insert_with(|| value.clone());
        }

        EnvSnapshot { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for EnvSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> EnvSnapshot {
        EnvSnapshot {
            vars: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn deferred_rewrites_bare_references() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.deferred("$PORT"), "%(ENV_PORT)s");
        assert_eq!(
            rewriter.deferred("listen on $HOST please"),
            "listen on %(ENV_HOST)s please"
        );
    }

    #[test]
    fn deferred_rewrites_braced_references() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.deferred("${PORT}"), "%(ENV_PORT)s");
        assert_eq!(rewriter.deferred("myapp:${TAG}"), "myapp:%(ENV_TAG)s");
    }

    #[test]
    fn deferred_drops_default_clauses() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.deferred("${TAG:latest}"), "%(ENV_TAG)s");
    }

    #[test]
    fn bare_references_stop_at_colons() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.deferred("$IMAGE:latest"), "%(ENV_IMAGE)s:latest");
    }

    #[test]
    fn input_without_references_is_unchanged() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.deferred("postgres:14"), "postgres:14");
        assert_eq!(rewriter.deferred(""), "");
        assert_eq!(
            rewriter.immediate("postgres:14", &snapshot(&[])),
            "postgres:14"
        );
    }

    #[test]
    fn immediate_resolves_against_the_snapshot() {
        let rewriter = EnvVarRewriter::new();
        let env = snapshot(&[("TAG", "2.0")]);
        assert_eq!(rewriter.immediate("myapp:${TAG:v1}", &env), "myapp:2.0");
        assert_eq!(rewriter.immediate("myapp:$TAG", &env), "myapp:2.0");
    }

    #[test]
    fn immediate_substitutes_empty_for_unset_variables() {
        let rewriter = EnvVarRewriter::new();
        assert_eq!(rewriter.immediate("myapp:${TAG}", &snapshot(&[])), "myapp:");
    }

    #[test]
    fn env_file_preserves_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(&path, "ZULU=1\nALPHA=two\nMIKE=3\n").unwrap();

        let env_file = EnvFile::load(&path).unwrap();
        let keys: Vec<&str> = env_file.pairs.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, vec!["ZULU", "ALPHA", "MIKE"]);
    }

    #[test]
    fn missing_env_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = EnvFile::load(dir.path().join("no-such.env")).unwrap();
        assert!(env_file.pairs.is_empty());
    }

    #[test]
    fn capture_prefers_process_variables_over_the_file() {
        let env_file = EnvFile {
            pairs: vec![("PATH".to_owned(), "/definitely/not".to_owned())],
        };
        let env = EnvSnapshot::capture(&env_file);
        assert_ne!(env.get("PATH"), Some("/definitely/not"));
    }
}
