//! Process lookup through procfs.

use std::path::Path;

use volshare_common::VolshareResult;

/// Kernel limit on the length of `/proc/<pid>/comm`.
const COMM_MAX: usize = 15;

/// Find the ids of processes whose command name is `name`.
///
/// `proc_root` is normally `/proc`. Processes that exit during the scan are
/// skipped.
pub fn find_processes_by_name(proc_root: &Path, name: &str) -> VolshareResult<Vec<i32>> {
    let wanted = name.get(..COMM_MAX).unwrap_or(name);
    let mut pids = Vec::new();

    for entry in std::fs::read_dir(proc_root)? {
        let entry = entry?;
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|s| s.parse::<i32>().ok())
        else {
            continue;
        };

        let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
            continue;
        };

        if comm.trim_end_matches('\n') == wanted {
            pids.push(pid);
        }
    }

    pids.sort_unstable();
    Ok(pids)
}
