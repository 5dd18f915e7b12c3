//! NFS-Ganesha export configuration.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use volshare_common::{VolshareError, VolshareResult};

use super::{Exporter, GANESHA_PROCESS, find_processes_by_name};

/// An `EXPORT` block of the Ganesha configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    /// Export id, unique within the configuration.
    pub id: u16,
    /// Exported directory.
    pub path: PathBuf,
    /// NFSv4 pseudo path.
    pub pseudo: String,
}

impl ExportEntry {
    /// Export of `volume` mounted below `export_root`.
    #[must_use]
    pub fn for_volume(id: u16, export_root: &Path, volume: &str) -> Self {
        Self {
            id,
            path: export_root.join(volume),
            pseudo: format!("/{volume}"),
        }
    }
}

/// Render an `EXPORT` block for a VFS-backed read-write NFSv4 export.
#[must_use]
pub fn render_export(entry: &ExportEntry) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "EXPORT");
    let _ = writeln!(block, "{{");
    let _ = writeln!(block, "\tExport_Id = {};", entry.id);
    let _ = writeln!(block, "\tPath = {};", entry.path.display());
    let _ = writeln!(block, "\tPseudo = {};", entry.pseudo);
    let _ = writeln!(block, "\tAccess_Type = RW;");
    let _ = writeln!(block, "\tSquash = No_root_squash;");
    let _ = writeln!(block, "\tSecType = sys;");
    let _ = writeln!(block, "\tProtocols = 4;");
    let _ = writeln!(block, "\tTransports = TCP;");
    let _ = writeln!(block, "\tFSAL {{");
    let _ = writeln!(block, "\t\tName = VFS;");
    let _ = writeln!(block, "\t}}");
    let _ = writeln!(block, "}}");
    block
}

/// A piece of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Section {
    /// Text outside export blocks, kept verbatim.
    Text(String),
    /// An export block with its original text.
    Export { entry: ExportEntry, text: String },
}

/// Split a configuration file into export blocks and surrounding text.
fn parse_sections(content: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut text = String::new();
    let mut block = String::new();
    let mut in_block = false;
    let mut opened = false;
    let mut depth: usize = 0;

    for line in content.split_inclusive('\n') {
        if !in_block {
            if is_export_header(line) {
                if !text.is_empty() {
                    sections.push(Section::Text(std::mem::take(&mut text)));
                }
                in_block = true;
                opened = false;
                depth = 0;
            } else {
                text.push_str(line);
                continue;
            }
        }

        block.push_str(line);
        let opens = line.matches('{').count();
        let closes = line.matches('}').count();
        opened |= opens > 0;
        depth = (depth + opens).saturating_sub(closes);

        if opened && depth == 0 {
            let text = std::mem::take(&mut block);
            match parse_entry(&text) {
                Some(entry) => sections.push(Section::Export { entry, text }),
                None => sections.push(Section::Text(text)),
            }
            in_block = false;
        }
    }

    // An unterminated block is left alone.
    text.push_str(&block);
    if !text.is_empty() {
        sections.push(Section::Text(text));
    }

    sections
}

fn is_export_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed
        .get(..6)
        .is_some_and(|keyword| keyword.eq_ignore_ascii_case("EXPORT"))
        && trimmed[6..]
            .trim_start()
            .chars()
            .next()
            .is_none_or(|c| c == '{')
}

fn parse_entry(block: &str) -> Option<ExportEntry> {
    let mut id = None;
    let mut path = None;
    let mut pseudo = None;

    // Statements end at `;` or a line break, and braces open or close a block.
    let statements = block
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
        .flat_map(|line| line.split([';', '{', '}']));
    for statement in statements {
        let Some((key, value)) = statement.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim().to_ascii_lowercase().as_str() {
            "export_id" => id = value.parse::<u16>().ok(),
            "path" => path = Some(PathBuf::from(value)),
            "pseudo" => pseudo = Some(value.to_string()),
            _ => {}
        }
    }

    Some(ExportEntry {
        id: id?,
        path: path?,
        pseudo: pseudo.unwrap_or_default(),
    })
}

/// Parse the export entries of a configuration file.
#[must_use]
pub fn parse_exports(content: &str) -> Vec<ExportEntry> {
    parse_sections(content)
        .into_iter()
        .filter_map(|section| match section {
            Section::Export { entry, .. } => Some(entry),
            Section::Text(_) => None,
        })
        .collect()
}

/// [`Exporter`] that edits a Ganesha configuration file and signals the server.
#[derive(Debug, Clone)]
pub struct GaneshaExporter {
    config_path: PathBuf,
    export_root: PathBuf,
    proc_root: PathBuf,
    process_name: String,
}

impl GaneshaExporter {
    /// Create an exporter for volumes mounted below `export_root`.
    pub fn new(config_path: impl Into<PathBuf>, export_root: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            export_root: export_root.into(),
            proc_root: PathBuf::from("/proc"),
            process_name: GANESHA_PROCESS.to_string(),
        }
    }

    /// Look for the server process below another procfs root.
    #[must_use]
    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    /// Look for a server process with another name.
    #[must_use]
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read_sections(&self) -> VolshareResult<Vec<Section>> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(content) => Ok(parse_sections(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the configuration file through a rename so readers never see a partial file.
    fn write_sections(&self, sections: &[Section]) -> VolshareResult<()> {
        let mut content = String::new();
        for section in sections {
            match section {
                Section::Text(text) | Section::Export { text, .. } => content.push_str(text),
            }
        }

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.config_path.with_extension("tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.config_path)?;
        Ok(())
    }

    fn server_pids(&self) -> Vec<i32> {
        find_processes_by_name(&self.proc_root, &self.process_name).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to scan processes");
            Vec::new()
        })
    }
}

impl Exporter for GaneshaExporter {
    fn create_export(&self, volume: &str) -> VolshareResult<u16> {
        let path = self.export_root.join(volume);
        let mut sections = self.read_sections()?;

        let mut next_id = 1;
        for section in &sections {
            if let Section::Export { entry, .. } = section {
                if entry.path == path {
                    tracing::debug!(volume, export_id = entry.id, "Export already exists");
                    return Ok(entry.id);
                }
                next_id = next_id.max(entry.id.saturating_add(1));
            }
        }

        if next_id == u16::MAX {
            return Err(VolshareError::Export {
                message: format!("no export id left in {}", self.config_path.display()),
            });
        }

        let entry = ExportEntry::for_volume(next_id, &self.export_root, volume);
        if let Some(Section::Text(text)) = sections.last_mut() {
            if !text.ends_with('\n') {
                text.push('\n');
            }
        }
        sections.push(Section::Export {
            text: render_export(&entry),
            entry,
        });
        self.write_sections(&sections)?;

        tracing::info!(volume, export_id = next_id, "Created export");
        Ok(next_id)
    }

    fn delete_export(&self, volume: &str) -> VolshareResult<()> {
        let path = self.export_root.join(volume);
        let mut sections = self.read_sections()?;

        let before = sections.len();
        sections.retain(|section| {
            !matches!(section, Section::Export { entry, .. } if entry.path == path)
        });
        if sections.len() == before {
            tracing::debug!(volume, "No export to delete");
            return Ok(());
        }

        self.write_sections(&sections)?;
        tracing::info!(volume, "Deleted export");
        Ok(())
    }

    fn reload(&self) -> VolshareResult<()> {
        let pids = self.server_pids();
        if pids.is_empty() {
            return Err(VolshareError::Export {
                message: format!("{} is not running", self.process_name),
            });
        }

        for pid in pids {
            tracing::debug!(pid, process = %self.process_name, "Sending SIGHUP");
            // SAFETY: kill(2) takes plain integers and has no memory safety requirements.
            #[allow(unsafe_code)]
            let rc = unsafe { libc::kill(pid, libc::SIGHUP) };
            if rc != 0 {
                return Err(VolshareError::Export {
                    message: format!(
                        "failed to signal {} ({pid}): {}",
                        self.process_name,
                        std::io::Error::last_os_error()
                    ),
                });
            }
        }

        Ok(())
    }

    fn server_running(&self) -> bool {
        !self.server_pids().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn exporter(dir: &Path) -> GaneshaExporter {
        GaneshaExporter::new(dir.join("vfs.conf"), "/export").with_proc_root(dir.join("proc"))
    }

    #[test]
    fn render_block() {
        let entry = ExportEntry::for_volume(3, Path::new("/export"), "pvc-1");
        let block = render_export(&entry);
        assert!(block.starts_with("EXPORT\n{\n\tExport_Id = 3;\n"));
        assert!(block.contains("\tPath = /export/pvc-1;\n"));
        assert!(block.contains("\tPseudo = /pvc-1;\n"));
        assert!(block.contains("\tFSAL {\n\t\tName = VFS;\n\t}\n"));
        assert!(block.ends_with("}\n"));
        assert_eq!(parse_exports(&block), vec![entry]);
    }

    #[test]
    fn keeps_text_outside_exports() {
        let content = "# managed by volshare\nNFS_CORE_PARAM { Protocols = 4; }\n";
        let sections = parse_sections(content);
        assert_eq!(sections, vec![Section::Text(content.to_string())]);
    }

    #[test]
    fn parses_inline_brace_header() {
        let content = "EXPORT {\n  Export_Id = 7;\n  Path = \"/export/pvc-9\";\n  FSAL { Name = VFS; }\n}\n";
        let exports = parse_exports(content);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].id, 7);
        assert_eq!(exports[0].path, PathBuf::from("/export/pvc-9"));
    }

    #[test]
    fn single_line_export_is_recognised() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(dir.path());
        std::fs::write(
            exporter.config_path(),
            "EXPORT { Export_Id = 1; Path = /export/pvc-1; Pseudo = /pvc-1; FSAL { Name = VFS; } }\n",
        )
        .unwrap();

        assert_eq!(exporter.create_export("pvc-1").unwrap(), 1);
        let content = std::fs::read_to_string(exporter.config_path()).unwrap();
        let exports = parse_exports(&content);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].pseudo, "/pvc-1");
        assert_eq!(exporter.create_export("pvc-2").unwrap(), 2);

        exporter.delete_export("pvc-1").unwrap();

        let content = std::fs::read_to_string(exporter.config_path()).unwrap();
        assert!(!content.contains("/export/pvc-1"));
        assert_eq!(parse_exports(&content).len(), 1);
    }

    #[test]
    fn commented_keys_are_ignored() {
        let content = "EXPORT {\n  Export_Id = 2;\n  # Path = /export/old;\n  Path = /export/pvc-2;\n}\n";
        let exports = parse_exports(content);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].path, PathBuf::from("/export/pvc-2"));
    }

    #[test]
    fn create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(dir.path());

        assert_eq!(exporter.create_export("pvc-1").unwrap(), 1);
        assert_eq!(exporter.create_export("pvc-1").unwrap(), 1);
        assert_eq!(exporter.create_export("pvc-2").unwrap(), 2);

        let content = std::fs::read_to_string(exporter.config_path()).unwrap();
        assert_eq!(parse_exports(&content).len(), 2);
    }

    #[test]
    fn delete_keeps_other_content() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = exporter(dir.path());
        std::fs::write(exporter.config_path(), "# header\n").unwrap();

        exporter.create_export("pvc-1").unwrap();
        exporter.create_export("pvc-2").unwrap();
        exporter.delete_export("pvc-1").unwrap();
        exporter.delete_export("pvc-1").unwrap();

        let content = std::fs::read_to_string(exporter.config_path()).unwrap();
        assert!(content.starts_with("# header\n"));
        let exports = parse_exports(&content);
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].path, PathBuf::from("/export/pvc-2"));
    }

    #[test]
    fn delete_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        exporter(dir.path()).delete_export("pvc-1").unwrap();
        assert!(!dir.path().join("vfs.conf").exists());
    }

    #[test]
    fn server_detection_and_reload_without_server() {
        let dir = tempfile::tempdir().unwrap();
        let proc_root = dir.path().join("proc");
        std::fs::create_dir_all(proc_root.join("1")).unwrap();
        std::fs::write(proc_root.join("1/comm"), "init\n").unwrap();

        let exporter = exporter(dir.path());
        assert!(!exporter.server_running());
        assert!(matches!(
            exporter.reload(),
            Err(VolshareError::Export { .. })
        ));

        std::fs::create_dir_all(proc_root.join("99")).unwrap();
        std::fs::write(proc_root.join("99/comm"), "ganesha.nfsd\n").unwrap();
        assert!(exporter.server_running());
    }

    proptest! {
        #[test]
        fn export_ids_stay_unique(names in proptest::collection::btree_set("[a-z][a-z0-9-]{0,12}", 1..8)) {
            let dir = tempfile::tempdir().unwrap();
            let exporter = exporter(dir.path());

            let mut ids = Vec::new();
            for name in &names {
                ids.push(exporter.create_export(name).unwrap());
            }
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), names.len());

            let content = std::fs::read_to_string(exporter.config_path()).unwrap();
            prop_assert_eq!(parse_exports(&content).len(), names.len());
        }
    }
}
