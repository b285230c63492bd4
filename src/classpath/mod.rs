//! Project classpath: the search roots a plugin's compiled classes and
//! dependencies live in.
//!
//! This stands in for a JVM classloader. It indexes every entry of every
//! root once (first root wins on duplicate names, like a classloader),
//! answers service-registry lookups from `META-INF/services`, and loads
//! parsed class files for hierarchy and method checks.

pub mod classfile;
pub mod eval;

use crate::error::{LintError, Result};
use classfile::{ClassFile, MethodInfo};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SERVICES_DIR: &str = "META-INF/services";
const OBJECT: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathRoot {
    Directory(PathBuf),
    Jar(PathBuf),
}

impl ClassPathRoot {
    pub fn path(&self) -> &Path {
        match self {
            ClassPathRoot::Directory(p) | ClassPathRoot::Jar(p) => p,
        }
    }
}

/// Result of a subtype query when parts of the hierarchy may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignability {
    Yes,
    No,
    /// Some supertype could not be loaded, so the answer is not known.
    Unknown,
}

#[derive(Debug, Default)]
pub struct ClassPath {
    roots: Vec<ClassPathRoot>,
    /// Entry name (`a/b/C.class`) -> index of the first root providing it.
    entries: IndexMap<String, usize>,
    cache: Mutex<HashMap<String, Arc<ClassFile>>>,
}

/// Convert `a.b.C` to the entry name `a/b/C.class`.
pub fn class_entry_name(fqcn: &str) -> String {
    format!("{}.class", fqcn.replace('.', "/"))
}

impl ClassPath {
    /// Index all roots. Missing roots are skipped with a debug log; an
    /// unreadable JAR is skipped with a warning.
    pub fn new(roots: Vec<ClassPathRoot>) -> Self {
        let mut entries: IndexMap<String, usize> = IndexMap::new();
        for (i, root) in roots.iter().enumerate() {
            let names = match root {
                ClassPathRoot::Directory(dir) => {
                    if !dir.is_dir() {
                        debug!(root = %dir.display(), "classpath directory missing; skipped");
                        continue;
                    }
                    list_directory(dir)
                }
                ClassPathRoot::Jar(jar) => match list_jar(jar) {
                    Ok(n) => n,
                    Err(e) => {
                        warn!(jar = %jar.display(), error = %e, "unreadable JAR skipped");
                        continue;
                    }
                },
            };
            for name in names {
                entries.entry(name).or_insert(i);
            }
        }
        debug!(
            roots = roots.len(),
            entries = entries.len(),
            "classpath indexed"
        );
        ClassPath {
            roots,
            entries,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn roots(&self) -> &[ClassPathRoot] {
        &self.roots
    }

    pub fn contains_entry(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn contains_class(&self, fqcn: &str) -> bool {
        self.contains_entry(&class_entry_name(fqcn))
    }

    /// Read an entry from the first root that provides it.
    pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.entries.get(name) {
            Some(i) => read_from_root(&self.roots[*i], name),
            None => Ok(None),
        }
    }

    /// Fully qualified names of all classes on the classpath, in index
    /// order. Module and package descriptors are excluded.
    pub fn class_names(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.keys().filter_map(|k| {
            let stem = k.strip_suffix(".class")?;
            if stem.ends_with("module-info") || stem.ends_with("package-info") {
                return None;
            }
            Some(stem.replace('/', "."))
        })
    }

    /// Implementation class names registered for `contract` in every
    /// root's `META-INF/services/<contract>` file, in classpath order.
    ///
    /// Unlike class lookup this reads all roots, the way a service loader
    /// merges registrations from every JAR.
    pub fn service_entries(&self, contract: &str) -> Vec<String> {
        let name = format!("{}/{}", SERVICES_DIR, contract);
        let mut out: Vec<String> = Vec::new();
        for root in &self.roots {
            let data = match read_from_root(root, &name) {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                Err(e) => {
                    warn!(root = %root.path().display(), error = %e, "service file unreadable");
                    continue;
                }
            };
            for impl_name in parse_service_file(&String::from_utf8_lossy(&data)) {
                if !out.contains(&impl_name) {
                    out.push(impl_name);
                }
            }
        }
        out
    }

    /// Load and parse a class by its fully qualified name.
    pub fn load_class(&self, fqcn: &str) -> Result<Arc<ClassFile>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(cf) = cache.get(fqcn) {
                return Ok(Arc::clone(cf));
            }
        }
        let entry = class_entry_name(fqcn);
        let data = self
            .read_entry(&entry)?
            .ok_or_else(|| LintError::ClassNotFound(fqcn.to_string()))?;
        let cf = ClassFile::parse(&data).map_err(|e| LintError::ClassFormat {
            name: fqcn.to_string(),
            message: e.0,
        })?;
        let cf = Arc::new(cf);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(fqcn.to_string(), Arc::clone(&cf));
        }
        Ok(cf)
    }

    /// Whether `fqcn` is `target` or a subtype of it through superclasses
    /// and (super-)interfaces.
    pub fn is_assignable(&self, fqcn: &str, target: &str) -> Assignability {
        let mut queue: VecDeque<String> = VecDeque::from([fqcn.to_string()]);
        let mut seen: HashSet<String> = HashSet::new();
        let mut unknown = false;
        while let Some(cur) = queue.pop_front() {
            if cur == target {
                return Assignability::Yes;
            }
            if cur == OBJECT || !seen.insert(cur.clone()) {
                continue;
            }
            match self.load_class(&cur) {
                Ok(cf) => {
                    if let Some(s) = &cf.super_class {
                        queue.push_back(s.clone());
                    }
                    queue.extend(cf.interfaces.iter().cloned());
                }
                Err(_) => unknown = true,
            }
        }
        if unknown {
            Assignability::Unknown
        } else {
            Assignability::No
        }
    }

    /// Find a concrete method along the superclass chain.
    ///
    /// Returns the declaring class with the method, or `None` when no
    /// non-abstract declaration exists in the loadable part of the chain.
    pub fn find_concrete_method(
        &self,
        fqcn: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<ClassFile>, MethodInfo)> {
        let mut cur = Some(fqcn.to_string());
        let mut depth = 0;
        while let Some(c) = cur {
            if c == OBJECT || depth > 32 {
                break;
            }
            let cf = self.load_class(&c).ok()?;
            if let Some(m) = cf.method(name, descriptor) {
                if !m.is_abstract() {
                    let m = m.clone();
                    return Some((cf, m));
                }
            }
            cur = cf.super_class.clone();
            depth += 1;
        }
        None
    }
}

/// Parse a service-registration file: one class per line, `#` comments.
pub fn parse_service_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn list_directory(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            names.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
    names
}

fn open_jar(jar: &Path) -> Result<zip::ZipArchive<fs::File>> {
    let f = fs::File::open(jar).map_err(|e| LintError::io(jar, e))?;
    zip::ZipArchive::new(f).map_err(|e| LintError::zip(jar, e))
}

fn list_jar(jar: &Path) -> Result<Vec<String>> {
    let mut archive = open_jar(jar)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i).map_err(|e| LintError::zip(jar, e))?;
        if !file.is_dir() {
            names.push(file.name().to_string());
        }
    }
    Ok(names)
}

fn read_from_root(root: &ClassPathRoot, name: &str) -> Result<Option<Vec<u8>>> {
    match root {
        ClassPathRoot::Directory(dir) => {
            let p = dir.join(name);
            if !p.is_file() {
                return Ok(None);
            }
            fs::read(&p).map(Some).map_err(|e| LintError::io(&p, e))
        }
        ClassPathRoot::Jar(jar) => {
            let mut archive = open_jar(jar)?;
            let mut file = match archive.by_name(name) {
                Ok(f) => f,
                Err(zip::result::ZipError::FileNotFound) => return Ok(None),
                Err(e) => return Err(LintError::zip(jar, e)),
            };
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| LintError::io(jar, e))?;
            Ok(Some(buf))
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::fs;
    use std::io::Write;
    use std::path::Path;

    /// Write a class file into a class directory under its package path.
    pub fn write_class(dir: &Path, fqcn: &str, bytes: &[u8]) {
        let p = dir.join(super::class_entry_name(fqcn));
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, bytes).unwrap();
    }

    pub fn write_service(dir: &Path, contract: &str, impls: &[&str]) {
        let p = dir.join(super::SERVICES_DIR).join(contract);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, impls.join("\n")).unwrap();
    }

    /// Build a JAR from `(entry name, bytes)` pairs.
    pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        let f = fs::File::create(path).unwrap();
        let mut w = zip::ZipWriter::new(f);
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            w.start_file(*name, opts).unwrap();
            w.write_all(data).unwrap();
        }
        w.finish().unwrap();
    }
}
