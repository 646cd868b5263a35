use std::env;
use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

use super::client::{SHORT_ID_LEN, short_id};

const DOCKERENV_PATH: &str = "/.dockerenv";
const INIT_CGROUP_PATH: &str = "/proc/1/cgroup";
const FULL_ID_LEN: usize = 64;

/// Whether this process runs inside a container, and if so under which
/// container id.
///
/// `container_id`, when present, is always the short 12-character form.
/// `in_container` can be true with an unknown id (e.g. under Kubernetes
/// or bare containerd, where the cgroup path carries no usable id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfIdentity {
    pub in_container: bool,
    pub container_id: Option<String>,
}

impl SelfIdentity {
    /// Compares a container id against this identity, after normalizing
    /// both sides to the short lowercase form.
    pub fn matches(&self, container_id: &str) -> bool {
        let Some(own_id) = self.container_id.as_deref() else {
            return false;
        };
        short_id(container_id).eq_ignore_ascii_case(own_id)
    }
}

/// Detects whether this process runs inside a Docker container.
///
/// Checks, in order: the `/.dockerenv` marker file, the init process
/// cgroup hierarchy, and finally the `HOSTNAME` environment variable
/// (Docker sets it to the container id by default). Detection is best
/// effort and never fails; an unreadable cgroup file simply contributes
/// nothing.
///
/// # Returns
///
/// The resolved [`SelfIdentity`]. On a plain host both fields are
/// falsy/absent.
pub fn detect() -> SelfIdentity {
    let mut identity = SelfIdentity::default();

    if Path::new(DOCKERENV_PATH).exists() {
        identity.in_container = true;
    }

    match fsutil::open_file_reader(INIT_CGROUP_PATH) {
        Ok(reader) => {
            let scanned = scan_cgroup(reader);
            identity.in_container |= scanned.in_container;
            identity.container_id = scanned.container_id;
        }
        Err(err) => log::debug!("cgroup self-detection skipped: {err}"),
    }

    if identity.in_container && identity.container_id.is_none() {
        identity.container_id = hostname_container_id();
    }

    identity
}

/// Scans cgroup lines (`/proc/1/cgroup` format) for container markers.
///
/// A path segment following `docker/` that is a hex string of at least
/// 12 characters yields the container id; `kubepods` and `containerd`
/// segments mark containment without an id.
fn scan_cgroup<R: BufRead>(reader: R) -> SelfIdentity {
    let mut identity = SelfIdentity::default();

    for line in reader.lines() {
        let Ok(line) = line else { break };

        if line.contains("kubepods") || line.contains("containerd") {
            identity.in_container = true;
        }

        if let Some(id) = docker_id_from_cgroup_line(&line) {
            identity.in_container = true;
            identity.container_id = Some(id);
            break;
        }
    }

    identity
}

fn docker_id_from_cgroup_line(line: &str) -> Option<String> {
    let mut segments = line.split('/');
    while let Some(segment) = segments.next() {
        if segment != "docker" {
            continue;
        }
        let Some(candidate) = segments.next() else {
            return None;
        };
        // Systemd-style scopes ("docker-<id>.scope") do not use a path
        // segment, so only the plain nesting layout is handled here.
        if candidate.len() >= SHORT_ID_LEN && is_hex(candidate) {
            return Some(short_id(candidate));
        }
    }
    None
}

fn hostname_container_id() -> Option<String> {
    let hostname = env::var("HOSTNAME").ok()?;
    if (hostname.len() == SHORT_ID_LEN || hostname.len() == FULL_ID_LEN) && is_hex(&hostname) {
        return Some(short_id(&hostname));
    }
    None
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_scan_cgroup_docker_id() {
        let input = "12:cpuset:/docker/0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef\n";
        let identity = scan_cgroup(Cursor::new(input));
        assert!(identity.in_container);
        assert_eq!(identity.container_id.as_deref(), Some("0123456789ab"));
    }

    #[test]
    fn test_scan_cgroup_kubepods_without_id() {
        let input = "11:memory:/kubepods/burstable/pod1234/abcd\n";
        let identity = scan_cgroup(Cursor::new(input));
        assert!(identity.in_container);
        assert!(identity.container_id.is_none());
    }

    #[test]
    fn test_scan_cgroup_plain_host() {
        let input = "0::/init.scope\n1:name=systemd:/\n";
        let identity = scan_cgroup(Cursor::new(input));
        assert!(!identity.in_container);
        assert!(identity.container_id.is_none());
    }

    #[test]
    fn test_scan_cgroup_skips_non_hex_segment() {
        let input = "3:cpu:/docker/not-hex-at-all\n4:memory:/docker/feedfacefeedface\n";
        let identity = scan_cgroup(Cursor::new(input));
        assert!(identity.in_container);
        assert_eq!(identity.container_id.as_deref(), Some("feedfacefeed"));
    }

    #[test]
    fn test_matches_normalizes_to_short_form() {
        let identity = SelfIdentity {
            in_container: true,
            container_id: Some("0123456789ab".to_owned()),
        };
        assert!(identity.matches(
            "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
        ));
        assert!(identity.matches("0123456789AB"));
        assert!(!identity.matches("ffffffffffff"));
    }

    #[test]
    fn test_matches_without_identity() {
        let identity = SelfIdentity::default();
        assert!(!identity.matches("0123456789ab"));
    }
}
