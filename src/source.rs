//! Where class bytes come from: mod roots that are either directories of
//! compiled classes or jar files.

use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;
use memmap2::Mmap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

const CLASS_SUFFIX: &str = ".class";

/// `a.b.C` -> `a/b/C.class`.
pub fn class_name_to_class_path(class_name: &str) -> String {
    format!("{}{CLASS_SUFFIX}", class_name.replace('.', "/"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModRoot {
    Directory(PathBuf),
    Jar(PathBuf),
}

/// Where one class was read from, for log messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLocation {
    File(PathBuf),
    JarEntry { jar: PathBuf, entry: String },
}

impl fmt::Display for ClassLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassLocation::File(path) => write!(f, "{}", path.display()),
            ClassLocation::JarEntry { jar, entry } => write!(f, "{}!/{entry}", jar.display()),
        }
    }
}

impl ModRoot {
    /// A directory becomes a directory root; a `.jar` or `.zip` file a jar root.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).with_context(|| format!("cannot access root {}", path.display()))?;
        if meta.is_dir() {
            return Ok(ModRoot::Directory(path));
        }
        if path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
        {
            return Ok(ModRoot::Jar(path));
        }
        bail!("{} is neither a directory nor a jar", path.display())
    }

    pub fn path(&self) -> &Path {
        match self {
            ModRoot::Directory(path) | ModRoot::Jar(path) => path,
        }
    }

    /// Calls `visit` with every compiled class under this root. Entries that
    /// cannot be read are logged against `mod_ids` and skipped; only failing
    /// to open the root itself is an error.
    pub fn for_each_class(&self, mod_ids: &str, mut visit: impl FnMut(&ClassLocation, &[u8])) -> Result<()> {
        match self {
            ModRoot::Directory(dir) => {
                let walker = WalkBuilder::new(dir)
                    .hidden(false)
                    .git_ignore(false)
                    .git_global(false)
                    .git_exclude(false)
                    .ignore(false)
                    .parents(false)
                    .sort_by_file_name(|a, b| a.cmp(b))
                    .build();

                for entry in walker {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!(mod_ids, root = %dir.display(), error = %e, "Error walking class directory");
                            continue;
                        }
                    };
                    let path = entry.path();
                    if !entry.file_type().is_some_and(|t| t.is_file())
                        || !path.extension().is_some_and(|e| e == "class")
                    {
                        continue;
                    }
                    let location = ClassLocation::File(path.to_path_buf());
                    match fs::read(path) {
                        Ok(bytes) => visit(&location, &bytes),
                        Err(e) => warn!(mod_ids, class = %location, error = %e, "Error reading class file"),
                    }
                }
                Ok(())
            }
            ModRoot::Jar(jar) => {
                let file = File::open(jar).with_context(|| format!("cannot open jar {}", jar.display()))?;
                let mmap = unsafe { Mmap::map(&file).with_context(|| format!("mmap failed: {}", jar.display()))? };
                let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
                    .with_context(|| format!("cannot read zip structure of {}", jar.display()))?;

                let mut buf = Vec::new();
                for i in 0..archive.len() {
                    let mut entry = match archive.by_index(i) {
                        Ok(entry) => entry,
                        Err(e) => {
                            warn!(mod_ids, jar = %jar.display(), index = i, error = %e, "Error reading jar entry");
                            continue;
                        }
                    };
                    if entry.is_dir() || !entry.name().ends_with(CLASS_SUFFIX) {
                        continue;
                    }
                    let location = ClassLocation::JarEntry {
                        jar: jar.clone(),
                        entry: entry.name().to_string(),
                    };
                    buf.clear();
                    match entry.read_to_end(&mut buf) {
                        Ok(_) => visit(&location, &buf),
                        Err(e) => warn!(mod_ids, class = %location, error = %e, "Error reading class file"),
                    }
                }
                Ok(())
            }
        }
    }

    /// Reads one resource by its `/`-separated path, if this root has it.
    pub fn read_resource(&self, resource: &str) -> Result<Option<(ClassLocation, Vec<u8>)>> {
        match self {
            ModRoot::Directory(dir) => {
                let path = dir.join(resource);
                if !path.is_file() {
                    return Ok(None);
                }
                let bytes = fs::read(&path).with_context(|| format!("cannot read {}", path.display()))?;
                Ok(Some((ClassLocation::File(path), bytes)))
            }
            ModRoot::Jar(jar) => {
                let file = File::open(jar).with_context(|| format!("cannot open jar {}", jar.display()))?;
                let mmap = unsafe { Mmap::map(&file).with_context(|| format!("mmap failed: {}", jar.display()))? };
                let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
                    .with_context(|| format!("cannot read zip structure of {}", jar.display()))?;
                let mut entry = match archive.by_name(resource) {
                    Ok(entry) => entry,
                    Err(zip::result::ZipError::FileNotFound) => return Ok(None),
                    Err(e) => {
                        return Err(e).with_context(|| format!("cannot read {resource} in {}", jar.display()));
                    }
                };
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry
                    .read_to_end(&mut bytes)
                    .with_context(|| format!("cannot read {resource} in {}", jar.display()))?;
                Ok(Some((
                    ClassLocation::JarEntry {
                        jar: jar.clone(),
                        entry: resource.to_string(),
                    },
                    bytes,
                )))
            }
        }
    }
}

/// Looks a resource up in each root in turn; the first root that has it wins.
/// A root that fails to read is logged against `mod_ids` and passed over.
pub fn find_resource<'a>(
    roots: impl IntoIterator<Item = &'a ModRoot>,
    resource: &str,
    mod_ids: &str,
) -> Option<(ClassLocation, Vec<u8>)> {
    for root in roots {
        match root.read_resource(resource) {
            Ok(Some(found)) => return Some(found),
            Ok(None) => {}
            Err(e) => warn!(
                mod_ids,
                resource,
                root = %root.path().display(),
                error = %format!("{e:#}"),
                "Error reading class resource"
            ),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;
    use zip::write::{FileOptions, ZipWriter};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(prefix: &str, suffix: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        p.push(format!(
            "{prefix}-{}-{}-{n}{suffix}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_millis(),
        ));
        p
    }

    #[test]
    fn class_name_maps_to_resource_path() {
        assert_eq!(class_name_to_class_path("a.b.C"), "a/b/C.class");
        assert_eq!(class_name_to_class_path("a.b.C$D"), "a/b/C$D.class");
    }

    #[test]
    fn directory_root_walks_classes_only() {
        let dir = temp_path("event-scanner-source", "");
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::write(dir.join("a/b/C.class"), b"c").unwrap();
        fs::write(dir.join("a/A.class"), b"a").unwrap();
        fs::write(dir.join("a/b/notes.txt"), b"x").unwrap();
        fs::write(dir.join(".hidden.class"), b"h").unwrap();

        let root = ModRoot::from_path(&dir).unwrap();
        assert_eq!(root, ModRoot::Directory(dir.clone()));

        let mut seen = Vec::new();
        root.for_each_class("[test]", |location, bytes| {
            seen.push((location.to_string(), bytes.to_vec()));
        })
        .unwrap();
        let contents: Vec<&[u8]> = seen.iter().map(|(_, b)| b.as_slice()).collect();
        assert_eq!(contents, vec![b"h".as_slice(), b"a", b"c"]);

        let (location, bytes) = root.read_resource("a/b/C.class").unwrap().unwrap();
        assert_eq!(bytes, b"c");
        assert_eq!(location, ClassLocation::File(dir.join("a/b/C.class")));
        assert!(root.read_resource("a/b/Missing.class").unwrap().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn jar_root_reads_entries() {
        let jar_path = temp_path("event-scanner-source", ".jar");
        let file = File::create(&jar_path).unwrap();
        let mut zip = ZipWriter::new(file);
        zip.add_directory("a/", FileOptions::default()).unwrap();
        zip.start_file("a/B.class", FileOptions::default()).unwrap();
        zip.write_all(b"b").unwrap();
        zip.start_file("META-INF/MANIFEST.MF", FileOptions::default()).unwrap();
        zip.write_all(b"Manifest-Version: 1.0\n").unwrap();
        zip.finish().unwrap();

        let root = ModRoot::from_path(&jar_path).unwrap();
        let mut seen = Vec::new();
        root.for_each_class("[test]", |location, bytes| seen.push((location.to_string(), bytes.to_vec())))
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.ends_with(".jar!/a/B.class"));
        assert_eq!(seen[0].1, b"b");

        let roots = vec![root];
        assert!(find_resource(&roots, "a/B.class", "[test]").is_some());
        assert!(find_resource(&roots, "a/C.class", "[test]").is_none());

        let _ = fs::remove_file(&jar_path);
    }

    #[test]
    #[traced_test]
    fn unreadable_root_does_not_hide_later_roots() {
        let broken = temp_path("event-scanner-source", ".jar");
        fs::write(&broken, b"not a zip").unwrap();
        let dir = temp_path("event-scanner-source", "");
        fs::create_dir_all(dir.join("a")).unwrap();
        fs::write(dir.join("a/B.class"), b"b").unwrap();

        let roots = vec![
            ModRoot::from_path(&broken).unwrap(),
            ModRoot::from_path(&dir).unwrap(),
        ];
        let (location, bytes) = find_resource(&roots, "a/B.class", "[broken]").unwrap();
        assert_eq!(location, ClassLocation::File(dir.join("a/B.class")));
        assert_eq!(bytes, b"b");
        assert!(logs_contain("Error reading class resource"));
        assert!(logs_contain("[broken]"));

        assert!(roots[0].for_each_class("[broken]", |_, _| {}).is_err());

        let _ = fs::remove_file(&broken);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    #[traced_test]
    fn corrupt_jar_entry_is_logged_with_mod_ids() {
        let jar_path = temp_path("event-scanner-source", ".jar");
        let mut zip = ZipWriter::new(File::create(&jar_path).unwrap());
        let stored = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        zip.start_file("a/Bad.class", stored).unwrap();
        zip.write_all(b"payload-to-corrupt").unwrap();
        zip.start_file("a/Good.class", stored).unwrap();
        zip.write_all(b"good").unwrap();
        zip.finish().unwrap();

        let mut raw = fs::read(&jar_path).unwrap();
        let at = raw
            .windows(b"payload-to-corrupt".len())
            .position(|w| w == b"payload-to-corrupt")
            .unwrap();
        raw[at] = b'P';
        fs::write(&jar_path, &raw).unwrap();

        let root = ModRoot::from_path(&jar_path).unwrap();
        let mut seen = Vec::new();
        root.for_each_class("[corrupt_mod]", |location, _| seen.push(location.to_string()))
            .unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with("a/Good.class"));
        assert!(logs_contain("Error reading class file"));
        assert!(logs_contain("[corrupt_mod]"));

        let _ = fs::remove_file(&jar_path);
    }

    #[test]
    fn rejects_plain_files() {
        let path = temp_path("event-scanner-source", ".txt");
        fs::write(&path, b"x").unwrap();
        assert!(ModRoot::from_path(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
