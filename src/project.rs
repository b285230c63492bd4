//! Project setup: turn a path, JAR or git URL into a `ProjectContext`.
//!
//! The context owns the project's classpath and, for JAR and git inputs,
//! the temporary directory the input was unpacked into. That directory is
//! removed when the context is dropped.

use crate::classpath::{ClassPath, ClassPathRoot};
use crate::error::{LintError, Result};
use crate::maven::{BuildOptions, MavenBuild};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, info, warn};

pub const MAVEN_RESOURCES_DIR: &str = "src/main/resources";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectInput {
    Directory(PathBuf),
    Jar(PathBuf),
    Git(String),
}

impl ProjectInput {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(LintError::Input("project path is empty".into()));
        }
        if is_git_url(trimmed) {
            return Ok(ProjectInput::Git(trimmed.to_string()));
        }
        let path = PathBuf::from(trimmed);
        if path.is_dir() {
            return Ok(ProjectInput::Directory(path));
        }
        let is_jar = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("jar"));
        if path.is_file() && is_jar {
            return Ok(ProjectInput::Jar(path));
        }
        Err(LintError::Input(format!(
            "'{}' is neither a directory, a .jar file nor a git URL",
            trimmed
        )))
    }
}

fn is_git_url(s: &str) -> bool {
    s.starts_with("https://")
        || s.starts_with("http://")
        || s.starts_with("ssh://")
        || s.starts_with("git@")
        || s.starts_with("git://")
}

#[derive(Debug)]
/// Everything the pipeline needs to know about the project under test.
pub struct ProjectContext {
    pub project_root: PathBuf,
    /// Shared resources directory holding `bpe/` and `fhir/`.
    pub resources_dir: PathBuf,
    pub is_maven: bool,
    pub classpath: ClassPath,
    workspace: Option<TempDir>,
}

impl ProjectContext {
    /// Context for an on-disk project with a classpath derived from its
    /// layout.
    pub fn from_directory(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let is_maven = project_root.join("pom.xml").is_file();
        let classpath = ClassPath::new(classpath_roots(&project_root, is_maven));
        Self::new(project_root, is_maven, classpath)
    }

    pub fn new(project_root: PathBuf, is_maven: bool, classpath: ClassPath) -> Self {
        let maven_resources = project_root.join(MAVEN_RESOURCES_DIR);
        let resources_dir = if is_maven && maven_resources.is_dir() {
            maven_resources
        } else {
            project_root.clone()
        };
        Self {
            project_root,
            resources_dir,
            is_maven,
            classpath,
            workspace: None,
        }
    }

    /// Materialize `input` on disk, optionally build it, and index its
    /// classpath.
    pub fn setup(input: &ProjectInput, build: Option<&BuildOptions>) -> Result<Self> {
        let (root, workspace) = match input {
            ProjectInput::Directory(dir) => (dir.clone(), None),
            ProjectInput::Jar(jar) => {
                let tmp = temp_workspace()?;
                extract_jar(jar, tmp.path())?;
                (tmp.path().to_path_buf(), Some(tmp))
            }
            ProjectInput::Git(url) => {
                let tmp = temp_workspace()?;
                let dest = tmp.path().join("project");
                clone_repository(url, &dest)?;
                (dest, Some(tmp))
            }
        };
        let is_maven = root.join("pom.xml").is_file();
        if let Some(opts) = build {
            if is_maven {
                MavenBuild::from_options(&root, opts).run(&root)?;
            } else {
                warn!(root = %root.display(), "build requested but no pom.xml found; skipped");
            }
        }
        let roots = classpath_roots(&root, is_maven);
        if is_maven && !root.join("target/classes").is_dir() {
            warn!(
                root = %root.display(),
                "target/classes is missing; build the project first or pass --build"
            );
        }
        let classpath = ClassPath::new(roots);
        let mut ctx = Self::new(root, is_maven, classpath);
        ctx.workspace = workspace;
        info!(
            root = %ctx.project_root.display(),
            maven = ctx.is_maven,
            resources = %ctx.resources_dir.display(),
            classpath_roots = ctx.classpath.roots().len(),
            "project ready"
        );
        Ok(ctx)
    }

    /// True when the project lives in a temporary directory owned by this
    /// context.
    pub fn is_temporary(&self) -> bool {
        self.workspace.is_some()
    }
}

fn temp_workspace() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("dsf-linter-")
        .tempdir()
        .map_err(|e| LintError::io(std::env::temp_dir(), e))
}

/// Classpath search roots in lookup order.
///
/// Maven: `target/classes`, then `target/dependency/*.jar`, then
/// `lib/*.jar`. Anything else: the root itself, its `*.jar` files and
/// `lib/*.jar`.
pub fn classpath_roots(root: &Path, is_maven: bool) -> Vec<ClassPathRoot> {
    let mut roots = Vec::new();
    if is_maven {
        roots.push(ClassPathRoot::Directory(root.join("target/classes")));
        roots.extend(jars_in(&root.join("target/dependency")));
    } else {
        roots.push(ClassPathRoot::Directory(root.to_path_buf()));
        roots.extend(jars_in(root));
    }
    roots.extend(jars_in(&root.join("lib")));
    roots
}

fn jars_in(dir: &Path) -> Vec<ClassPathRoot> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let pattern = format!("{}/*.jar", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut jars: Vec<PathBuf> = match glob::glob(&pattern) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list JARs");
            Vec::new()
        }
    };
    jars.sort();
    jars.into_iter().map(ClassPathRoot::Jar).collect()
}

/// Unpack every entry of `jar` into `dest`.
pub fn extract_jar(jar: &Path, dest: &Path) -> Result<()> {
    let file = File::open(jar).map_err(|e| LintError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| LintError::zip(jar, e))?;
    archive.extract(dest).map_err(|e| LintError::zip(jar, e))?;
    debug!(jar = %jar.display(), entries = archive.len(), "JAR extracted");
    Ok(())
}

fn clone_repository(url: &str, dest: &Path) -> Result<()> {
    info!(url, "cloning repository");
    let status = Command::new("git")
        .args(["clone", "--depth", "1", "--quiet", url])
        .arg(dest)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .map_err(|e| LintError::Input(format!("could not run git: {}", e)))?;
    if !status.success() {
        return Err(LintError::Input(format!(
            "git clone of '{}' failed with code {}",
            url,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::testing::write_jar;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_input_kinds() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("plugin.jar");
        fs::write(&jar, b"PK").unwrap();
        assert_eq!(
            ProjectInput::parse(dir.path().to_str().unwrap()).unwrap(),
            ProjectInput::Directory(dir.path().to_path_buf())
        );
        assert_eq!(
            ProjectInput::parse(jar.to_str().unwrap()).unwrap(),
            ProjectInput::Jar(jar.clone())
        );
        assert!(matches!(
            ProjectInput::parse(
                "https://github.com/datasharingframework/dsf-process-ping-pong.git"
            ),
            Ok(ProjectInput::Git(_))
        ));
        assert!(ProjectInput::parse(dir.path().join("nope").to_str().unwrap()).is_err());
        assert!(ProjectInput::parse("  ").is_err());
    }

    #[test]
    fn test_maven_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("pom.xml"), "<project/>").unwrap();
        fs::create_dir_all(root.join("src/main/resources/bpe")).unwrap();
        fs::create_dir_all(root.join("target/classes")).unwrap();
        fs::create_dir_all(root.join("target/dependency")).unwrap();
        fs::write(root.join("target/dependency/b.jar"), "").unwrap();
        fs::write(root.join("target/dependency/a.jar"), "").unwrap();
        let input = ProjectInput::Directory(root.to_path_buf());
        let ctx = ProjectContext::setup(&input, None).unwrap();
        assert!(ctx.is_maven);
        assert!(!ctx.is_temporary());
        assert_eq!(ctx.resources_dir, root.join("src/main/resources"));
        let roots = classpath_roots(root, true);
        assert_eq!(
            roots,
            vec![
                ClassPathRoot::Directory(root.join("target/classes")),
                ClassPathRoot::Jar(root.join("target/dependency/a.jar")),
                ClassPathRoot::Jar(root.join("target/dependency/b.jar")),
            ]
        );
    }

    #[test]
    fn test_plain_directory_uses_root() {
        let dir = tempdir().unwrap();
        let ctx = ProjectContext::from_directory(dir.path());
        assert!(!ctx.is_maven);
        assert_eq!(ctx.resources_dir, dir.path());
        assert_eq!(
            classpath_roots(dir.path(), false)[0],
            ClassPathRoot::Directory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_jar_is_extracted_and_cleaned_up() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("plugin.jar");
        write_jar(
            &jar,
            &[
                ("bpe/ping.bpmn", b"<definitions/>".as_slice()),
                ("META-INF/services/x.Y", b"a.B\n".as_slice()),
            ],
        );
        let ctx = ProjectContext::setup(&ProjectInput::Jar(jar), None).unwrap();
        assert!(ctx.is_temporary());
        assert!(!ctx.is_maven);
        assert!(ctx.resources_dir.join("bpe/ping.bpmn").is_file());
        assert!(ctx.classpath.contains_entry("META-INF/services/x.Y"));
        let root = ctx.project_root.clone();
        drop(ctx);
        assert!(!root.exists());
    }

    #[test]
    fn test_corrupt_jar_is_a_zip_error() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("broken.jar");
        fs::write(&jar, b"not a zip").unwrap();
        let err = ProjectContext::setup(&ProjectInput::Jar(jar), None).unwrap_err();
        assert!(matches!(err, LintError::Zip { .. }));
    }
}
