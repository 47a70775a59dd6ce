//! `git-upload-pack` over smart-HTTP (protocol v0/v1)
//!
//! Only full clones and fetches of the single commit are supported: no
//! deltas are computed and shallow requests are answered as if the history
//! were already complete.

use std::collections::HashSet;

use super::object::ObjectId;
use super::pack::write_pack;
use super::pktline::{self, Pkt, PktReader};
use super::repository::Repository;
use super::GitError;

pub const ADVERTISEMENT_CONTENT_TYPE: &str = "application/x-git-upload-pack-advertisement";
pub const RESULT_CONTENT_TYPE: &str = "application/x-git-upload-pack-result";

const CAPABILITIES: &str = "side-band-64k ofs-delta shallow no-progress";

/// Side-band channel carrying pack data
const BAND_DATA: u8 = 1;

/// Largest side-band payloads, leaving room for the channel byte
const SIDE_BAND_64K_CHUNK: usize = pktline::MAX_DATA_LEN - 1;
const SIDE_BAND_CHUNK: usize = 999 - 4;

/// Ref advertisement for `GET info/refs?service=git-upload-pack`
pub fn advertise_refs(repo: &Repository) -> Vec<u8> {
    let mut out = Vec::new();
    pktline::write_str(&mut out, "# service=git-upload-pack\n");
    pktline::flush(&mut out);

    match repo.head_commit() {
        Some(head) => {
            let caps = format!("{} symref=HEAD:{}", CAPABILITIES, repo.head_target());
            pktline::write_str(&mut out, &format!("{} HEAD\0{}\n", head, caps));
            for (name, id) in repo.refs() {
                pktline::write_str(&mut out, &format!("{} {}\n", id, name));
            }
        }
        None => {
            pktline::write_str(
                &mut out,
                &format!("{} capabilities^{{}}\0{}\n", ObjectId::ZERO, CAPABILITIES),
            );
        }
    }

    pktline::flush(&mut out);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideBand {
    None,
    Small,
    Large,
}

/// A decoded upload-pack request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub wants: Vec<ObjectId>,
    pub haves: Vec<ObjectId>,
    pub shallows: Vec<ObjectId>,
    pub capabilities: Vec<String>,
    pub deepen: Option<u32>,
    pub done: bool,
}

impl UploadRequest {
    pub fn parse(body: &[u8]) -> Result<Self, GitError> {
        let mut req = UploadRequest::default();

        for pkt in PktReader::new(body) {
            let line = match pkt? {
                Pkt::Flush | Pkt::Delim => continue,
                data => data
                    .text()
                    .ok_or_else(|| GitError::Malformed("non UTF-8 request line".into()))?,
            };

            let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
            match command {
                "want" => {
                    let mut parts = arg.split(' ');
                    let id = parse_id(parts.next().unwrap_or(""))?;
                    if req.wants.is_empty() {
                        req.capabilities = parts.map(str::to_string).collect();
                    }
                    req.wants.push(id);
                }
                "have" => req.haves.push(parse_id(arg)?),
                "shallow" => req.shallows.push(parse_id(arg)?),
                "deepen" => {
                    let depth = arg
                        .trim()
                        .parse()
                        .map_err(|_| GitError::Malformed(format!("invalid deepen {}", arg)))?;
                    req.deepen = Some(depth);
                }
                "done" => req.done = true,
                // deepen-since, deepen-not, filter: ignored
                _ => {}
            }
        }

        Ok(req)
    }

    fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }

    fn side_band(&self) -> SideBand {
        if self.has_capability("side-band-64k") {
            SideBand::Large
        } else if self.has_capability("side-band") {
            SideBand::Small
        } else {
            SideBand::None
        }
    }
}

fn parse_id(hex: &str) -> Result<ObjectId, GitError> {
    ObjectId::from_hex(hex).ok_or_else(|| GitError::Malformed(format!("invalid object id {}", hex)))
}

/// Answer an upload-pack request
pub fn upload_pack(repo: &Repository, req: &UploadRequest) -> Result<Vec<u8>, GitError> {
    let mut out = Vec::new();
    if req.wants.is_empty() {
        return Ok(out);
    }

    for want in &req.wants {
        if repo.object(want).is_none() {
            return Err(GitError::UnknownObject(*want));
        }
    }

    if req.deepen.is_some() || !req.shallows.is_empty() {
        // No shallow/unshallow lines: the single commit has no parents
        pktline::flush(&mut out);
    }

    let common = req.haves.iter().find(|id| repo.object(id).is_some());

    if !req.done {
        match common {
            Some(id) => pktline::write_str(&mut out, &format!("ACK {}\n", id)),
            None => pktline::write_str(&mut out, "NAK\n"),
        }
        return Ok(out);
    }

    match common {
        Some(id) => pktline::write_str(&mut out, &format!("ACK {}\n", id)),
        None => pktline::write_str(&mut out, "NAK\n"),
    }

    let have: HashSet<ObjectId> = match common {
        Some(_) => repo.reachable(&req.haves).into_iter().collect(),
        None => HashSet::new(),
    };
    let ids: Vec<ObjectId> = repo
        .reachable(&req.wants)
        .into_iter()
        .filter(|id| !have.contains(id))
        .collect();
    let objects: Vec<_> = ids.iter().filter_map(|id| repo.object(id)).collect();
    let pack = write_pack(objects)?;

    let chunk = match req.side_band() {
        SideBand::None => {
            out.extend_from_slice(&pack);
            return Ok(out);
        }
        SideBand::Small => SIDE_BAND_CHUNK,
        SideBand::Large => SIDE_BAND_64K_CHUNK,
    };

    for part in pack.chunks(chunk) {
        let mut data = Vec::with_capacity(part.len() + 1);
        data.push(BAND_DATA);
        data.extend_from_slice(part);
        pktline::write(&mut out, &data);
    }
    pktline::flush(&mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository::from_files([(".gitlab-ci.yml", "test:\n  script: [echo hello]\n")])
    }

    fn request(lines: &[&str], done: bool) -> Vec<u8> {
        let mut body = Vec::new();
        for line in lines {
            pktline::write_str(&mut body, &format!("{}\n", line));
        }
        pktline::flush(&mut body);
        if done {
            pktline::write_str(&mut body, "done\n");
        }
        body
    }

    #[test]
    fn test_advertisement_lists_head_and_main() {
        let repo = repo();
        let head = repo.head_commit().unwrap();
        let adv = advertise_refs(&repo);
        let lines: Vec<_> = PktReader::new(&adv).collect::<Result<_, _>>().unwrap();

        assert_eq!(lines[0].text(), Some("# service=git-upload-pack"));
        assert_eq!(lines[1], Pkt::Flush);
        let first = lines[2].text().unwrap();
        assert!(first.starts_with(&format!("{} HEAD\0", head)));
        assert!(first.contains("side-band-64k"));
        assert!(first.contains("symref=HEAD:refs/heads/main"));
        assert_eq!(
            lines[3].text(),
            Some(format!("{} refs/heads/main", head).as_str())
        );
        assert_eq!(lines[4], Pkt::Flush);
    }

    #[test]
    fn test_parse_request() {
        let head = repo().head_commit().unwrap();
        let body = request(
            &[
                &format!("want {} side-band-64k ofs-delta", head),
                "deepen 1",
            ],
            true,
        );
        let req = UploadRequest::parse(&body).unwrap();
        assert_eq!(req.wants, vec![head]);
        assert_eq!(req.deepen, Some(1));
        assert!(req.done);
        assert_eq!(req.side_band(), SideBand::Large);
    }

    #[test]
    fn test_clone_with_side_band() {
        let repo = repo();
        let head = repo.head_commit().unwrap();
        let body = request(&[&format!("want {} side-band-64k", head)], true);
        let req = UploadRequest::parse(&body).unwrap();
        let resp = upload_pack(&repo, &req).unwrap();

        let pkts: Vec<_> = PktReader::new(&resp).collect::<Result<_, _>>().unwrap();
        assert_eq!(pkts[0].text(), Some("NAK"));
        let Pkt::Data(band) = pkts[1] else {
            panic!("expected pack data");
        };
        assert_eq!(band[0], BAND_DATA);
        assert_eq!(&band[1..5], b"PACK");
        // commit, tree and blob
        assert_eq!(&band[9..13], &3u32.to_be_bytes());
        assert_eq!(*pkts.last().unwrap(), Pkt::Flush);
    }

    #[test]
    fn test_clone_without_side_band_is_raw() {
        let repo = repo();
        let head = repo.head_commit().unwrap();
        let req = UploadRequest::parse(&request(&[&format!("want {}", head)], true)).unwrap();
        let resp = upload_pack(&repo, &req).unwrap();
        assert!(resp.starts_with(b"0008NAK\n"));
        assert_eq!(&resp[8..12], b"PACK");
    }

    #[test]
    fn test_negotiation_without_done_only_naks() {
        let repo = repo();
        let head = repo.head_commit().unwrap();
        let req = UploadRequest::parse(&request(&[&format!("want {}", head)], false)).unwrap();
        assert_eq!(upload_pack(&repo, &req).unwrap(), b"0008NAK\n");
    }

    #[test]
    fn test_deepen_sends_empty_shallow_section() {
        let repo = repo();
        let head = repo.head_commit().unwrap();
        let req = UploadRequest::parse(&request(
            &[&format!("want {}", head), "deepen 50"],
            true,
        ))
        .unwrap();
        let resp = upload_pack(&repo, &req).unwrap();
        assert!(resp.starts_with(b"00000008NAK\n"));
    }

    #[test]
    fn test_unknown_want_is_rejected() {
        let repo = repo();
        let unknown = ObjectId::hash(crate::git::ObjectKind::Blob, b"nope");
        let req = UploadRequest::parse(&request(&[&format!("want {}", unknown)], true)).unwrap();
        assert!(matches!(
            upload_pack(&repo, &req),
            Err(GitError::UnknownObject(id)) if id == unknown
        ));
    }
}
