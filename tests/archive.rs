use std::io::{Cursor, Write};
use std::sync::Mutex;

use camino::Utf8PathBuf;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use gcis_query::archive::fetch_and_extract;
use gcis_query::codepage::{Codepage, KeepName, NameRepair, Reencode};
use gcis_query::error::GcisError;
use gcis_query::gcis::GcisClient;

/// Name as an archiver that stored Big5 bytes without the UTF-8 flag would
/// present it after cp437 decoding.
fn mojibake(name: &str) -> String {
    let (bytes, _, _) = encoding_rs::BIG5.encode(name);
    Codepage::Cp437.decode(&bytes).into_owned()
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

struct ArchiveServer {
    archive: Vec<u8>,
    downloads: Mutex<Vec<String>>,
}

impl GcisClient for ArchiveServer {
    fn download(&self, url: &str) -> Result<Vec<u8>, GcisError> {
        self.downloads.lock().unwrap().push(url.to_string());
        Ok(self.archive.clone())
    }

    fn fetch_page(&self, _url: &str) -> Result<String, GcisError> {
        Err(GcisError::Http("not used".to_string()))
    }
}

fn utf8_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

#[test]
fn cp437_big5_repair_recovers_name() {
    let garbled = mojibake("董監事資料集.csv");
    assert_eq!(garbled, "╕│║╩¿╞╕Ω«╞╢░.csv");
    assert_eq!(Reencode::default().repair(&garbled), "董監事資料集.csv");
}

#[test]
fn extracts_and_renames_entries_in_listing_order() {
    let temp = tempfile::tempdir().unwrap();
    let dest = utf8_dir(&temp).join("extract");
    let server = ArchiveServer {
        archive: build_zip(&[
            (mojibake("董監事資料集.csv").as_str(), "統一編號,公司名稱\n".as_bytes()),
            ("README.txt", b"ascii".as_slice()),
        ]),
        downloads: Mutex::new(Vec::new()),
    };

    let paths = fetch_and_extract(&server, "mock://bod.zip", &dest, &Reencode::default()).unwrap();

    assert_eq!(
        paths,
        vec![dest.join("董監事資料集.csv"), dest.join("README.txt")]
    );
    assert!(!dest.join(mojibake("董監事資料集.csv")).exists());
    assert_eq!(
        std::fs::read_to_string(&paths[0]).unwrap(),
        "統一編號,公司名稱\n"
    );
    assert_eq!(server.downloads.lock().unwrap().len(), 1);
}

#[test]
fn keep_name_leaves_entries_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let dest = utf8_dir(&temp);
    let garbled = mojibake("台灣.csv");
    let server = ArchiveServer {
        archive: build_zip(&[(garbled.as_str(), b"x".as_slice())]),
        downloads: Mutex::new(Vec::new()),
    };

    let paths = fetch_and_extract(&server, "mock://a.zip", &dest, &KeepName).unwrap();
    assert_eq!(paths, vec![dest.join(&garbled)]);
}

#[test]
fn directory_entries_are_repaired_too() {
    let temp = tempfile::tempdir().unwrap();
    let dest = utf8_dir(&temp);
    let dir = format!("{}/", mojibake("公司名稱"));
    let file = format!("{dir}{}", mojibake("台灣.csv"));
    let server = ArchiveServer {
        archive: build_zip(&[(dir.as_str(), b"".as_slice()), (file.as_str(), b"x".as_slice())]),
        downloads: Mutex::new(Vec::new()),
    };

    let paths = fetch_and_extract(&server, "mock://a.zip", &dest, &Reencode::default()).unwrap();
    assert_eq!(
        paths,
        vec![dest.join("公司名稱"), dest.join("公司名稱").join("台灣.csv")]
    );
    assert!(paths[1].is_file());
}

#[test]
fn download_errors_propagate() {
    struct Offline;

    impl GcisClient for Offline {
        fn download(&self, _url: &str) -> Result<Vec<u8>, GcisError> {
            Err(GcisError::Http("connection refused".to_string()))
        }

        fn fetch_page(&self, _url: &str) -> Result<String, GcisError> {
            Err(GcisError::Http("connection refused".to_string()))
        }
    }

    let temp = tempfile::tempdir().unwrap();
    let result = fetch_and_extract(&Offline, "mock://a.zip", &utf8_dir(&temp), &KeepName);
    assert!(matches!(result, Err(GcisError::Http(_))));
}

#[test]
fn garbage_archive_is_an_archive_error() {
    let temp = tempfile::tempdir().unwrap();
    let server = ArchiveServer {
        archive: b"definitely not a zip".to_vec(),
        downloads: Mutex::new(Vec::new()),
    };
    let result = fetch_and_extract(&server, "mock://a.zip", &utf8_dir(&temp), &KeepName);
    assert!(matches!(result, Err(GcisError::Archive(_))));
}

/// Archive whose single entry name is the raw Big5 encoding of `name`, stored
/// without the UTF-8 flag the way legacy Windows archivers write it.
fn legacy_big5_zip(name: &str) -> Vec<u8> {
    let (raw, _, _) = encoding_rs::BIG5.encode(name);
    let placeholder = format!("{}.csv", "q".repeat(raw.len() - ".csv".len()));
    let mut bytes = build_zip(&[(placeholder.as_str(), b"x".as_slice())]);

    let needle = placeholder.as_bytes();
    let mut patched = 0;
    let mut at = 0;
    while let Some(offset) = bytes[at..]
        .windows(needle.len())
        .position(|window| window == needle)
    {
        let start = at + offset;
        bytes[start..start + needle.len()].copy_from_slice(&raw);
        at = start + needle.len();
        patched += 1;
    }
    // local header and central directory
    assert_eq!(patched, 2);
    bytes
}

#[test]
fn unflagged_big5_names_are_repaired() {
    for name in ["董監事資料集.csv", "許功蓋.csv"] {
        let temp = tempfile::tempdir().unwrap();
        let dest = utf8_dir(&temp);
        let server = ArchiveServer {
            archive: legacy_big5_zip(name),
            downloads: Mutex::new(Vec::new()),
        };

        let paths = fetch_and_extract(&server, "mock://a.zip", &dest, &Reencode::default()).unwrap();
        assert_eq!(paths, vec![dest.join(name)]);
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), "x");
    }
}
