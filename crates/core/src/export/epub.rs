//! EPUB 3 export: a zip container with the `mimetype` entry stored first
//! and uncompressed, then the OPF package, nav document and one XHTML file
//! per chapter.

use super::{xml_escape, ExportError};
use crate::story::Manuscript;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub fn export_epub(manuscript: &Manuscript, path: &Path) -> Result<PathBuf, ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let zip_err = |source| ExportError::Zip {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut zip = ZipWriter::new(file);

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zip.start_file("mimetype", stored).map_err(zip_err)?;
    zip.write_all(b"application/epub+zip").map_err(io_err)?;

    let deflated = SimpleFileOptions::default();
    zip.start_file("META-INF/container.xml", deflated)
        .map_err(zip_err)?;
    zip.write_all(CONTAINER_XML.as_bytes()).map_err(io_err)?;

    zip.start_file("OEBPS/content.opf", deflated).map_err(zip_err)?;
    zip.write_all(package_document(manuscript).as_bytes())
        .map_err(io_err)?;

    zip.start_file("OEBPS/nav.xhtml", deflated).map_err(zip_err)?;
    zip.write_all(nav_document(manuscript).as_bytes())
        .map_err(io_err)?;

    for chapter in &manuscript.chapters {
        zip.start_file(format!("OEBPS/chapter_{}.xhtml", chapter.number), deflated)
            .map_err(zip_err)?;
        zip.write_all(chapter_document(manuscript, chapter.number).as_bytes())
            .map_err(io_err)?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(path.to_path_buf())
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn package_document(manuscript: &Manuscript) -> String {
    let title = xml_escape(&manuscript.title);
    let mut manifest = String::from(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    let mut spine = String::new();
    for chapter in &manuscript.chapters {
        manifest.push_str(&format!(
            "    <item id=\"ch{0}\" href=\"chapter_{0}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            chapter.number
        ));
        spine.push_str(&format!("    <itemref idref=\"ch{}\"/>\n", chapter.number));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:snowflake:{title}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:language>en</dc:language>
    <meta property="dcterms:modified">2000-01-01T00:00:00Z</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#
    )
}

fn nav_document(manuscript: &Manuscript) -> String {
    let mut items = String::new();
    for chapter in &manuscript.chapters {
        items.push_str(&format!(
            "        <li><a href=\"chapter_{0}.xhtml\">Chapter {0}</a></li>\n",
            chapter.number
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head><title>{}</title></head>
  <body>
    <nav epub:type="toc">
      <ol>
{items}      </ol>
    </nav>
  </body>
</html>
"#,
        xml_escape(&manuscript.title)
    )
}

fn chapter_document(manuscript: &Manuscript, number: u32) -> String {
    let mut body = format!("    <h1>Chapter {number}</h1>\n");
    for chapter in &manuscript.chapters {
        if chapter.number != number {
            continue;
        }
        for scene in &chapter.scenes {
            for paragraph in scene.prose.split("\n\n") {
                let trimmed = paragraph.trim();
                if !trimmed.is_empty() {
                    body.push_str(&format!("    <p>{}</p>\n", xml_escape(trimmed)));
                }
            }
        }
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head><title>Chapter {number}</title></head>
  <body>
{body}  </body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::{Chapter, SceneProse};
    use std::io::Read;

    fn manuscript() -> Manuscript {
        Manuscript {
            title: "Maps & Monsters".into(),
            chapters: vec![
                Chapter {
                    number: 1,
                    scenes: vec![SceneProse {
                        scene: 1,
                        pov: "Mara".into(),
                        prose: "First paragraph.\n\nSecond <paragraph>.".into(),
                        word_count: 4,
                    }],
                },
                Chapter {
                    number: 2,
                    scenes: vec![SceneProse {
                        scene: 2,
                        pov: "Mara".into(),
                        prose: "Another scene.".into(),
                        word_count: 2,
                    }],
                },
            ],
        }
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        export_epub(&manuscript(), &path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }

    #[test]
    fn contains_package_nav_and_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        export_epub(&manuscript(), &path).unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        for name in [
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/chapter_1.xhtml",
            "OEBPS/chapter_2.xhtml",
        ] {
            assert!(archive.by_name(name).is_ok(), "missing {name}");
        }

        let mut opf = String::new();
        archive
            .by_name("OEBPS/content.opf")
            .unwrap()
            .read_to_string(&mut opf)
            .unwrap();
        assert!(opf.contains("Maps &amp; Monsters"));
        assert!(opf.contains("<itemref idref=\"ch2\"/>"));

        let mut chapter = String::new();
        archive
            .by_name("OEBPS/chapter_1.xhtml")
            .unwrap()
            .read_to_string(&mut chapter)
            .unwrap();
        assert!(chapter.contains("<p>Second &lt;paragraph&gt;.</p>"));
    }
}
