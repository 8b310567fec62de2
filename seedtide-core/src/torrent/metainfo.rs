//! `.torrent` metainfo loading: info hash, size and tiered announce list

use std::collections::HashMap;
use std::path::Path;

use sha1::{Digest, Sha1};

use super::{InfoHash, TorrentError};

type BencodeDict<'a> = HashMap<&'a [u8], bencode_rs::Value<'a>>;
type ParseResult<T> = Result<T, TorrentError>;

/// Torrent metadata needed to fake-seed a torrent.
///
/// Piece hashes and file layout are irrelevant when no data is exchanged;
/// only identity, size and trackers are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    pub name: String,
    pub total_length: u64,
    /// Announce-list tiers in priority order (BEP 12)
    pub tiers: Vec<Vec<String>>,
}

impl TorrentMetadata {
    /// Number of tracker URLs across all tiers.
    pub fn tracker_count(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }
}

/// Reads and parses a `.torrent` file.
///
/// # Errors
///
/// - `TorrentError::Io` - File cannot be read
/// - `TorrentError::InvalidTorrentFile` - Malformed metainfo
pub async fn parse_torrent_file(path: &Path) -> Result<TorrentMetadata, TorrentError> {
    let file_contents = tokio::fs::read(path).await?;
    parse_torrent_data(&file_contents)
}

/// Parses bencoded metainfo bytes.
///
/// # Errors
///
/// - `TorrentError::InvalidTorrentFile` - Malformed bencode, missing `info`
///   or no tracker URL at all
pub fn parse_torrent_data(torrent_bytes: &[u8]) -> Result<TorrentMetadata, TorrentError> {
    let parsed = bencode_rs::Value::parse(torrent_bytes).map_err(|e| {
        TorrentError::InvalidTorrentFile {
            reason: format!("Bencode parsing failed: {e:?}"),
        }
    })?;

    let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
        return Err(invalid("Root element must be dictionary"));
    };

    let bencode_rs::Value::Dictionary(info) = dict
        .get(b"info".as_slice())
        .ok_or_else(|| invalid("Missing 'info' field"))?
    else {
        return Err(invalid("Info field must be dictionary"));
    };

    let info_hash = calculate_info_hash(torrent_bytes)?;
    let name = extract_string(info, b"name")?;
    let total_length = extract_total_length(info)?;
    let tiers = extract_tiers(dict)?;

    Ok(TorrentMetadata {
        info_hash,
        name,
        total_length,
        tiers,
    })
}

fn invalid(reason: &str) -> TorrentError {
    TorrentError::InvalidTorrentFile {
        reason: reason.to_string(),
    }
}

/// SHA-1 over the raw bytes of the root dictionary's `info` value.
fn calculate_info_hash(data: &[u8]) -> ParseResult<InfoHash> {
    let (start, end) = find_info_span(data)?;

    let mut hasher = Sha1::new();
    hasher.update(&data[start..end]);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&hasher.finalize());

    Ok(InfoHash::new(hash))
}

/// Walks the root dictionary's keys and returns the byte span of `info`.
fn find_info_span(data: &[u8]) -> ParseResult<(usize, usize)> {
    if data.first() != Some(&b'd') {
        return Err(invalid("Expected dictionary start"));
    }

    let mut pos = 1;
    while pos < data.len() && data[pos] != b'e' {
        let (key_start, key_end) = read_string(data, pos)?;
        let value_end = find_value_end(data, key_end)?;
        if &data[key_start..key_end] == b"info" {
            return Ok((key_end, value_end));
        }
        pos = value_end;
    }

    Err(invalid("Could not find info dictionary in data"))
}

/// Reads a `<len>:<bytes>` string at `pos`, returning the content span.
fn read_string(data: &[u8], pos: usize) -> ParseResult<(usize, usize)> {
    let colon = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|offset| pos + offset)
        .ok_or_else(|| invalid("Invalid string format"))?;

    let length: usize = std::str::from_utf8(&data[pos..colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("Invalid string length"))?;

    let end = colon + 1 + length;
    if end > data.len() {
        return Err(invalid("String exceeds data length"));
    }
    Ok((colon + 1, end))
}

/// Finds the end position (exclusive) of the bencode value starting at `pos`.
fn find_value_end(data: &[u8], pos: usize) -> ParseResult<usize> {
    let mut pos = pos;
    let mut depth = 0usize;

    loop {
        let byte = *data
            .get(pos)
            .ok_or_else(|| invalid("Incomplete bencode value"))?;
        match byte {
            b'd' | b'l' => {
                depth += 1;
                pos += 1;
            }
            b'e' if depth > 0 => {
                depth -= 1;
                pos += 1;
            }
            b'i' => {
                let end = data[pos..]
                    .iter()
                    .position(|&b| b == b'e')
                    .ok_or_else(|| invalid("Unterminated integer"))?;
                pos += end + 1;
            }
            b'0'..=b'9' => {
                let (_, end) = read_string(data, pos)?;
                pos = end;
            }
            _ => return Err(invalid("Invalid bencode character")),
        }

        if depth == 0 {
            return Ok(pos);
        }
    }
}

fn extract_string(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<String> {
    match dict.get(key) {
        Some(bencode_rs::Value::Bytes(bytes)) => {
            String::from_utf8(bytes.to_vec()).map_err(|_| TorrentError::InvalidTorrentFile {
                reason: format!("Invalid UTF-8 in field: {:?}", String::from_utf8_lossy(key)),
            })
        }
        _ => Err(TorrentError::InvalidTorrentFile {
            reason: format!(
                "Missing or invalid field: {:?}",
                String::from_utf8_lossy(key)
            ),
        }),
    }
}

fn extract_total_length(info: &BencodeDict<'_>) -> ParseResult<u64> {
    if let Some(bencode_rs::Value::Integer(length)) = info.get(b"length".as_slice()) {
        return Ok((*length).max(0) as u64);
    }

    let Some(bencode_rs::Value::List(files)) = info.get(b"files".as_slice()) else {
        return Err(invalid("Missing 'files' or 'length' field"));
    };

    files.iter().try_fold(0u64, |total, file| match file {
        bencode_rs::Value::Dictionary(file_dict) => match file_dict.get(b"length".as_slice()) {
            Some(bencode_rs::Value::Integer(length)) => Ok(total + (*length).max(0) as u64),
            _ => Err(invalid("Missing or invalid file length")),
        },
        _ => Err(invalid("Invalid file entry type")),
    })
}

/// Announce tiers from `announce-list`, falling back to `[[announce]]`.
fn extract_tiers(dict: &BencodeDict<'_>) -> ParseResult<Vec<Vec<String>>> {
    let mut tiers: Vec<Vec<String>> = Vec::new();

    if let Some(bencode_rs::Value::List(announce_list)) = dict.get(b"announce-list".as_slice()) {
        for tier in announce_list {
            let bencode_rs::Value::List(tier_urls) = tier else {
                continue;
            };
            let mut urls: Vec<String> = Vec::new();
            for url_value in tier_urls {
                if let bencode_rs::Value::Bytes(url_bytes) = url_value
                    && let Ok(url) = String::from_utf8(url_bytes.to_vec())
                    && !url.is_empty()
                    && !urls.contains(&url)
                {
                    urls.push(url);
                }
            }
            if !urls.is_empty() {
                tiers.push(urls);
            }
        }
    }

    if tiers.is_empty()
        && let Ok(announce) = extract_string(dict, b"announce")
        && !announce.is_empty()
    {
        tiers.push(vec![announce]);
    }

    if tiers.is_empty() {
        return Err(invalid("No announce URLs found"));
    }

    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE_TRACKER: &[u8] = b"d8:announce31:http://tracker.example/announce4:infod6:lengthi1048576e4:name9:test.file12:piece lengthi32768e6:pieces20:\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01\x01ee";

    fn info_bytes(torrent: &[u8]) -> &[u8] {
        let start = torrent
            .windows(6)
            .position(|window| window == b"4:info")
            .unwrap()
            + 6;
        &torrent[start..torrent.len() - 1]
    }

    #[test]
    fn test_parse_single_tracker_torrent() {
        let metadata = parse_torrent_data(SINGLE_TRACKER).unwrap();

        assert_eq!(metadata.name, "test.file");
        assert_eq!(metadata.total_length, 1_048_576);
        assert_eq!(
            metadata.tiers,
            vec![vec!["http://tracker.example/announce".to_string()]]
        );
        assert_eq!(metadata.tracker_count(), 1);
    }

    #[test]
    fn test_info_hash_covers_info_dictionary() {
        let metadata = parse_torrent_data(SINGLE_TRACKER).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(info_bytes(SINGLE_TRACKER));
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&hasher.finalize());
        assert_eq!(metadata.info_hash, InfoHash::new(expected));
    }

    #[test]
    fn test_announce_list_takes_precedence() {
        let torrent = b"d8:announce8:http://a13:announce-listll8:http://a8:http://a8:http://bel8:http://cel0:ee4:infod6:lengthi10e4:name1:xee";
        let metadata = parse_torrent_data(torrent).unwrap();

        assert_eq!(
            metadata.tiers,
            vec![
                vec!["http://a".to_string(), "http://b".to_string()],
                vec!["http://c".to_string()],
            ]
        );
    }

    #[test]
    fn test_multi_file_length() {
        let torrent = b"d8:announce8:http://a4:infod5:filesld6:lengthi5e4:pathl1:aeed6:lengthi7e4:pathl1:beee4:name3:diree";
        let metadata = parse_torrent_data(torrent).unwrap();
        assert_eq!(metadata.total_length, 12);
        assert_eq!(metadata.name, "dir");
    }

    #[test]
    fn test_missing_trackers_rejected() {
        let torrent = b"d4:infod6:lengthi10e4:name1:xee";
        assert!(matches!(
            parse_torrent_data(torrent),
            Err(TorrentError::InvalidTorrentFile { reason }) if reason.contains("No announce")
        ));
    }

    #[test]
    fn test_missing_info_rejected() {
        assert!(parse_torrent_data(b"d8:announce8:http://ae").is_err());
        assert!(parse_torrent_data(b"garbage").is_err());
    }

    #[test]
    fn test_find_value_end_nested() {
        let data = b"d3:keyd4:namei42eee";
        assert_eq!(find_value_end(data, 0).unwrap(), data.len());
        assert_eq!(find_value_end(b"i42e", 0).unwrap(), 4);
        assert_eq!(find_value_end(b"4:spam", 0).unwrap(), 6);
        assert!(find_value_end(b"d3:key", 0).is_err());
    }

    #[tokio::test]
    async fn test_parse_torrent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.torrent");
        std::fs::write(&path, SINGLE_TRACKER).unwrap();

        let metadata = parse_torrent_file(&path).await.unwrap();
        assert_eq!(metadata.name, "test.file");

        let missing = parse_torrent_file(&dir.path().join("missing.torrent")).await;
        assert!(matches!(missing, Err(TorrentError::Io(_))));
    }
}
