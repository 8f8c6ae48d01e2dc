use std::fs;
use std::path::Path;

use crate::error::{Result, ZfsyncError};

fn read_mounts() -> Result<String> {
    fs::read_to_string("/proc/self/mounts")
        .map_err(|e| ZfsyncError::message(format!("read /proc/self/mounts: {}", e)))
}

fn mountpoints(contents: &str) -> impl Iterator<Item = &Path> {
    contents.lines().filter_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            return None;
        }
        Some(Path::new(fields[1]))
    })
}

pub fn mountpoint_is_mounted(mountpoint: &Path) -> Result<bool> {
    let contents = read_mounts()?;
    let found = mountpoints(&contents).any(|mounted| mounted == mountpoint);
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mountpoints_reads_second_column() {
        let table = "/dev/sda1 / ext4 rw 0 0\n/dev/vg0/lv0_rsyncbackup_s /mnt/zfsync/lv0_rsyncbackup_s xfs ro 0 0\nbroken\n";
        let found: Vec<&Path> = mountpoints(table).collect();
        assert_eq!(found, vec![Path::new("/"), Path::new("/mnt/zfsync/lv0_rsyncbackup_s")]);
    }

    #[test]
    fn unknown_directory_is_not_mounted() {
        assert!(!mountpoint_is_mounted(Path::new("/nonexistent/zfsync")).expect("mounts"));
    }
}
