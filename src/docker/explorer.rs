//! Volume inspection through short-lived helper containers.
//!
//! Named volumes have no read API on the control socket, so listing and
//! reading happens by running a throwaway container with the volume
//! mounted read-only at `/volume`, capturing its output, and force
//! removing it afterwards. The helper never touches the volume's data
//! beyond `ls` and `cat`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bollard::models::{ContainerCreateBody, HostConfig};

use crate::error::ResultOkLogExt;

use super::client::Client;
use super::models::{VolumeFileContent, VolumeFileEntry};

/// Mount point of the inspected volume inside the helper container.
const VOLUME_MOUNT: &str = "/volume";

/// Upper bound on the cleanup removal call; a helper container leaking
/// past this is logged and left for the daemon.
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum field count of a parsable `ls -la --full-time` row.
const MIN_LISTING_FIELDS: usize = 9;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create helper container: {0}")]
    Create(#[source] super::Error),
    #[error("failed to start helper container: {0}")]
    Start(#[source] super::Error),
    #[error("failed waiting for helper container: {0}")]
    Wait(#[source] super::Error),
    #[error("failed to read helper container output: {0}")]
    Output(#[source] super::Error),
    #[error("command failed inside helper container: {stderr}")]
    Command { stderr: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lists the entries of `path` inside the named volume.
///
/// Runs `ls -la --full-time` in a helper container from `image` with the
/// volume mounted read-only. The `.` and `..` entries are dropped;
/// everything else is returned in listing order.
///
/// # Errors
///
/// Any failure of the helper container lifecycle, or a non-empty stderr
/// from the listing command (e.g. the path does not exist).
pub async fn list_directory(
    client: &Client,
    image: &str,
    volume_name: &str,
    path: &str,
) -> Result<Vec<VolumeFileEntry>> {
    let path = normalize_path(path);
    let target = format!("{VOLUME_MOUNT}{path}");
    let cmd = vec![
        "ls".to_owned(),
        "-la".to_owned(),
        "--full-time".to_owned(),
        target,
    ];

    let stdout = run_in_volume(client, image, volume_name, cmd).await?;
    Ok(parse_listing(&path, &String::from_utf8_lossy(&stdout)))
}

/// Reads the file at `path` inside the named volume.
///
/// UTF-8 files come back as plain text; binary files are
/// base64-encoded with the `encoding` field set. Either way `size` is
/// the file's raw byte length.
///
/// # Errors
///
/// Same failure modes as [`list_directory`]; a missing or unreadable
/// file surfaces as [`Error::Command`] with the shell's stderr.
pub async fn read_file(
    client: &Client,
    image: &str,
    volume_name: &str,
    path: &str,
) -> Result<VolumeFileContent> {
    let path = normalize_path(path);
    let target = format!("{VOLUME_MOUNT}{path}");
    let cmd = vec!["cat".to_owned(), target];

    let stdout = run_in_volume(client, image, volume_name, cmd).await?;
    Ok(file_content(path, stdout))
}

fn file_content(path: String, raw: Vec<u8>) -> VolumeFileContent {
    use base64::Engine;

    let size = raw.len() as u64;
    match String::from_utf8(raw) {
        Ok(content) => VolumeFileContent {
            path,
            content,
            size,
            encoding: None,
        },
        Err(err) => VolumeFileContent {
            path,
            content: base64::engine::general_purpose::STANDARD.encode(err.as_bytes()),
            size,
            encoding: Some("base64".to_owned()),
        },
    }
}

/// Runs a single command in a helper container with the volume mounted
/// read-only, returning captured stdout.
///
/// The container is force removed before returning, on success and on
/// failure alike; a failed removal is logged and absorbed so it never
/// masks the command result.
async fn run_in_volume(
    client: &Client,
    image: &str,
    volume_name: &str,
    cmd: Vec<String>,
) -> Result<Vec<u8>> {
    let name = helper_name();
    let body = ContainerCreateBody {
        image: Some(image.to_owned()),
        cmd: Some(cmd),
        host_config: Some(HostConfig {
            binds: Some(vec![format!("{volume_name}:{VOLUME_MOUNT}:ro")]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let id = client
        .create_ephemeral(&name, body)
        .await
        .map_err(Error::Create)?;

    let result = run_to_completion(client, &id).await;

    match tokio::time::timeout(CLEANUP_TIMEOUT, client.force_remove_container(&id)).await {
        Ok(removed) => {
            removed.ok_log_warn("failed to remove helper container");
        }
        Err(_) => log::warn!("timed out removing helper container `{id}`"),
    }

    result
}

async fn run_to_completion(client: &Client, id: &str) -> Result<Vec<u8>> {
    client.start_container(id).await.map_err(Error::Start)?;
    client.wait_not_running(id).await.map_err(Error::Wait)?;

    let (stdout, stderr) = client.collect_output(id).await.map_err(Error::Output)?;
    if !stderr.trim().is_empty() {
        return Err(Error::Command {
            stderr: stderr.trim().to_owned(),
        });
    }
    Ok(stdout)
}

fn helper_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("volume-explorer-{nanos}")
}

fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Parses `ls -la --full-time` output into file entries.
///
/// The summary line (`total N`) and rows with fewer than nine fields are
/// skipped, as are the `.` and `..` entries. Directories always report
/// size zero; an unparsable size also falls back to zero. File names may
/// contain spaces.
fn parse_listing(base_path: &str, output: &str) -> Vec<VolumeFileEntry> {
    let mut entries = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() == Some(&"total") {
            continue;
        }
        if fields.len() < MIN_LISTING_FIELDS {
            continue;
        }

        let mode = fields[0];
        let is_directory = mode.starts_with('d');
        let size = if is_directory {
            0
        } else {
            fields[4].parse().unwrap_or(0)
        };
        let mod_time = fields[5..8].join(" ");
        let name = fields[8..].join(" ");
        if name == "." || name == ".." {
            continue;
        }

        entries.push(VolumeFileEntry {
            path: join_path(base_path, &name),
            name,
            is_directory,
            size,
            mode: mode.to_owned(),
            mod_time,
        });
    }

    entries
}

fn join_path(base: &str, name: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing_single_file() {
        let output = "total 0\n\
            -rw-r--r-- 1 root root 12 2025-01-02 03:04:05.000000000 +0000 test.txt\n";
        let entries = parse_listing("/", output);
        assert_eq!(
            entries,
            vec![VolumeFileEntry {
                name: "test.txt".to_owned(),
                path: "/test.txt".to_owned(),
                is_directory: false,
                size: 12,
                mode: "-rw-r--r--".to_owned(),
                mod_time: "2025-01-02 03:04:05.000000000 +0000".to_owned(),
            }]
        );
    }

    #[test]
    fn test_parse_listing_skips_dot_entries_and_short_rows() {
        let output = "total 8\n\
            drwxr-xr-x 2 root root 4096 2025-01-02 03:04:05.000000000 +0000 .\n\
            drwxr-xr-x 3 root root 4096 2025-01-02 03:04:05.000000000 +0000 ..\n\
            garbage line\n\
            drwxr-xr-x 2 root root 4096 2025-01-02 03:04:05.000000000 +0000 data\n";
        let entries = parse_listing("/", output);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "data");
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_parse_listing_name_with_spaces() {
        let output =
            "-rw-r--r-- 1 root root 42 2025-06-07 08:09:10.000000000 +0000 my backup file.tar\n";
        let entries = parse_listing("/archives", output);
        assert_eq!(entries[0].name, "my backup file.tar");
        assert_eq!(entries[0].path, "/archives/my backup file.tar");
        assert_eq!(entries[0].size, 42);
    }

    #[test]
    fn test_parse_listing_unparsable_size_falls_back_to_zero() {
        let output = "-rw-r--r-- 1 root root huge 2025-06-07 08:09:10.000000000 +0000 blob\n";
        let entries = parse_listing("/", output);
        assert_eq!(entries[0].size, 0);
    }

    #[test]
    fn test_file_content_utf8_text_stays_plain() {
        let content = file_content("/notes.txt".to_owned(), b"hello volume\n".to_vec());
        assert_eq!(content.content, "hello volume\n");
        assert_eq!(content.size, 13);
        assert!(content.encoding.is_none());
    }

    #[test]
    fn test_file_content_binary_survives_byte_identical() {
        use base64::Engine;

        let raw = vec![0xff, 0xfe];
        let content = file_content("/blob.bin".to_owned(), raw.clone());
        assert_eq!(content.size, 2);
        assert_eq!(content.encoding.as_deref(), Some("base64"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&content.content)
            .unwrap();
        assert_eq!(decoded, raw);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("etc"), "/etc");
        assert_eq!(normalize_path("/etc"), "/etc");
    }
}
