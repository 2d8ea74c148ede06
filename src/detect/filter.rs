use std::path::Path;

use ignore::overrides::{Override, OverrideBuilder};

use crate::config::{DriftDefinition, Filter};

use super::DetectionError;

/// Include/exclude rules of a definition, compiled once per cycle.
///
/// A path is tracked when it matches at least one include (or there are no
/// includes) and matches no exclude. A filter's `path` selects a directory
/// relative to the base directory. Patterns are gitignore-style globs over the
/// rest of the path: one without `/` matches the file name at any depth below
/// that directory, one with `/` is anchored to it.
#[derive(Debug, Default)]
pub struct PathFilter {
    includes: Vec<CompiledFilter>,
    excludes: Vec<CompiledFilter>,
}

#[derive(Debug)]
struct CompiledFilter {
    dir: String,
    globs: Option<Override>,
}

impl PathFilter {
    pub fn from_definition(definition: &DriftDefinition) -> Result<Self, DetectionError> {
        Ok(Self {
            includes: compile_all(&definition.includes)?,
            excludes: compile_all(&definition.excludes)?,
        })
    }

    /// Whether `path` (relative, `/`-separated) should be tracked.
    pub fn matches(&self, path: &str) -> bool {
        let included =
            self.includes.is_empty() || self.includes.iter().any(|filter| filter.matches(path));
        included && !self.excludes.iter().any(|filter| filter.matches(path))
    }
}

fn compile_all(filters: &[Filter]) -> Result<Vec<CompiledFilter>, DetectionError> {
    filters.iter().map(CompiledFilter::compile).collect()
}

impl CompiledFilter {
    fn compile(filter: &Filter) -> Result<Self, DetectionError> {
        let dir = normalize_dir(&filter.path);
        let globs = match filter.pattern.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(pattern) => Some(compile_glob(pattern).map_err(|source| {
                DetectionError::Filter {
                    pattern: pattern.to_string(),
                    source,
                }
            })?),
        };
        Ok(Self { dir, globs })
    }

    fn matches(&self, path: &str) -> bool {
        let remainder = if self.dir.is_empty() {
            path
        } else {
            match path
                .strip_prefix(self.dir.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => return false,
            }
        };
        match &self.globs {
            None => true,
            Some(globs) => globs.matched(Path::new(remainder), false).is_whitelist(),
        }
    }
}

/// Compile one pattern as a whitelist override rooted at the filter directory.
///
/// A leading `!` or `#` is escaped so it stays literal.
fn compile_glob(pattern: &str) -> Result<Override, ignore::Error> {
    let glob = if pattern.starts_with(['!', '#']) {
        format!("\\{pattern}")
    } else {
        pattern.to_string()
    };
    let mut builder = OverrideBuilder::new(".");
    builder.add(&glob)?;
    builder.build()
}

fn normalize_dir(dir: &str) -> String {
    let dir = dir.replace('\\', "/");
    let dir = dir.trim_matches('/');
    let dir = dir.strip_prefix("./").unwrap_or(dir);
    if dir == "." {
        String::new()
    } else {
        dir.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(includes: &[(&str, Option<&str>)], excludes: &[(&str, Option<&str>)]) -> PathFilter {
        let mut definition = DriftDefinition::new(1, "conf", ".");
        for (path, pattern) in includes {
            definition = definition.include(Filter::new(*path, *pattern));
        }
        for (path, pattern) in excludes {
            definition = definition.exclude(Filter::new(*path, *pattern));
        }
        PathFilter::from_definition(&definition).unwrap()
    }

    #[test]
    fn empty_filter_tracks_everything() {
        let filter = PathFilter::default();
        assert!(filter.matches("a.txt"));
        assert!(filter.matches("deep/nested/b.bin"));
    }

    #[test]
    fn name_patterns_match_at_any_depth_below_the_directory() {
        let filter = filter(&[("conf", Some("*.xml"))], &[]);
        assert!(filter.matches("conf/server.xml"));
        assert!(filter.matches("conf/sub/web.xml"));
        assert!(!filter.matches("conf/server.properties"));
        assert!(!filter.matches("lib/server.xml"));
        assert!(!filter.matches("configuration/server.xml"));
    }

    #[test]
    fn path_patterns_match_the_remainder() {
        let filter = filter(&[("", Some("deploy/**/*.war"))], &[]);
        assert!(filter.matches("deploy/app.war"));
        assert!(filter.matches("deploy/a/b/app.war"));
        assert!(!filter.matches("other/app.war"));
    }

    #[test]
    fn excludes_win_over_includes() {
        let filter = filter(&[("", None)], &[("tmp", None), ("", Some("*.lock"))]);
        assert!(filter.matches("a.txt"));
        assert!(!filter.matches("tmp/scratch.txt"));
        assert!(!filter.matches("data/app.lock"));
    }

    #[test]
    fn question_mark_matches_one_character_and_dots_are_literal() {
        let filter = filter(&[("./logs/", Some("app-?.log"))], &[]);
        assert!(filter.matches("logs/app-1.log"));
        assert!(!filter.matches("logs/app-10.log"));
        assert!(!filter.matches("logs/app-1xlog"));
    }

    #[test]
    fn single_star_stays_within_one_directory() {
        let filter = filter(&[("", Some("deploy/*.war"))], &[]);
        assert!(filter.matches("deploy/app.war"));
        assert!(!filter.matches("deploy/old/app.war"));
    }

    #[test]
    fn leading_bang_is_a_literal_file_name() {
        let filter = filter(&[("", None)], &[("", Some("!draft.xml"))]);
        assert!(!filter.matches("!draft.xml"));
        assert!(filter.matches("draft.xml"));
    }
}
