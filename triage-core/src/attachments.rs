//! Writes a bug's attachments into the session testcase directory.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::bug::Attachment;
use crate::error::AttachmentError;

/// Review requests are attachments too, but never testcases.
const REVIEW_REQUEST_TYPE: &str = "text/x-phabricator-request";

/// Decode every live attachment into `dest`, oldest first, so later uploads
/// replace earlier files of the same name. Zip archives are extracted in
/// place of being written. Returns the number of files written.
pub fn materialize(attachments: &[Attachment], dest: &Path) -> Result<usize, AttachmentError> {
    let mut live: Vec<&Attachment> = attachments.iter().filter(|a| !a.is_obsolete).collect();
    live.sort_by(|a, b| a.creation_time.cmp(&b.creation_time));

    let mut written = 0;
    for attachment in live {
        if attachment.content_type == REVIEW_REQUEST_TYPE {
            continue;
        }

        let cleaned: String = attachment
            .data
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let data = match STANDARD.decode(cleaned) {
            Ok(data) => data,
            Err(e) => {
                warn!(attachment = attachment.id, error = %e, "Failed to decode attachment");
                continue;
            }
        };

        if attachment.file_name.ends_with(".zip") {
            written += unzip(&data, dest, attachment.id)?;
            continue;
        }

        let Some(name) = Path::new(&attachment.file_name).file_name() else {
            warn!(attachment = attachment.id, "Attachment has no usable file name");
            continue;
        };
        let target = dest.join(name);
        if target.exists() {
            warn!(attachment = attachment.id, file = %target.display(), "Duplicate filename");
        }
        std::fs::write(&target, &data)?;
        debug!(attachment = attachment.id, file = %attachment.file_name, "Wrote attachment");
        written += 1;
    }
    Ok(written)
}

fn unzip(data: &[u8], dest: &Path, id: u64) -> Result<usize, AttachmentError> {
    let mut archive = match ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!(attachment = id, error = %e, "Failed to decompress attachment");
            return Ok(0);
        }
    };

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(attachment = id, error = %e, "Failed to decompress attachment");
                return Ok(written);
            }
        };
        let Some(relative) = entry.enclosed_name() else {
            warn!(attachment = id, name = entry.name(), "Skipping archive entry outside testcase dir");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if target.exists() {
            warn!(attachment = id, file = %target.display(), "Duplicate filename");
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn attachment(id: u64, name: &str, data: &[u8], created: &str) -> Attachment {
        Attachment {
            id,
            file_name: name.into(),
            content_type: "text/plain".into(),
            creation_time: created.into(),
            data: STANDARD.encode(data),
            ..Attachment::default()
        }
    }

    fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn writes_live_attachments_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut old = attachment(1, "test.html", b"old", "2024-01-01T00:00:00Z");
        let new = attachment(2, "test.html", b"new", "2024-01-02T00:00:00Z");
        let mut obsolete = attachment(3, "stale.html", b"x", "2024-01-03T00:00:00Z");
        obsolete.is_obsolete = true;
        let mut review = attachment(4, "D1234", b"x", "2024-01-04T00:00:00Z");
        review.content_type = REVIEW_REQUEST_TYPE.into();
        old.description = "first upload".into();

        let written = materialize(&[new, old, obsolete, review], dir.path()).unwrap();
        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(dir.path().join("test.html")).unwrap(), "new");
        assert!(!dir.path().join("stale.html").exists());
        assert!(!dir.path().join("D1234").exists());
    }

    #[test]
    fn unpacks_zip_archives() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_bytes(&[("testcase.html", "<html>"), ("nested/prefs.js", "user_pref")]);
        let zipped = attachment(1, "bundle.zip", &data, "2024-01-01T00:00:00Z");

        assert_eq!(materialize(&[zipped], dir.path()).unwrap(), 2);
        assert!(dir.path().join("nested/prefs.js").is_file());
        assert!(!dir.path().join("bundle.zip").exists());
    }

    #[test]
    fn later_upload_overwrites_unpacked_file_of_same_name() {
        let dir = tempfile::tempdir().unwrap();
        let data = zip_bytes(&[("testcase.html", "<zip>")]);
        let zipped = attachment(1, "bundle.zip", &data, "2024-01-01T00:00:00Z");
        let plain = attachment(2, "testcase.html", b"<plain>", "2024-01-02T00:00:00Z");

        assert_eq!(materialize(&[plain, zipped], dir.path()).unwrap(), 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("testcase.html")).unwrap(),
            "<plain>"
        );
    }

    #[test]
    fn bad_payloads_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut undecodable = attachment(1, "a.html", b"", "2024-01-01T00:00:00Z");
        undecodable.data = "!!! not base64 !!!".into();
        let corrupt = attachment(2, "b.zip", b"PK not really", "2024-01-02T00:00:00Z");
        let good = attachment(3, "c.html", b"ok", "2024-01-03T00:00:00Z");

        assert_eq!(materialize(&[undecodable, corrupt, good], dir.path()).unwrap(), 1);
        assert!(dir.path().join("c.html").is_file());
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut wrapped = attachment(1, "w.html", b"", "2024-01-01T00:00:00Z");
        wrapped.data = "PGh0\nbWw+\n".into();
        assert_eq!(materialize(&[wrapped], dir.path()).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("w.html")).unwrap(), "<html>");
    }
}
