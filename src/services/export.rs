use crate::core::error::WizardError;
use crate::core::state::{InlineImage, Storyboard};
use anyhow::Result;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// One file of the export archive.
#[derive(Debug)]
pub struct ArchiveEntry<'a> {
    pub file_name: String,
    pub image: &'a InlineImage,
}

/// The files an export would contain, one per scene with a selection, in scene order.
pub fn selected_entries(board: &Storyboard) -> Vec<ArchiveEntry<'_>> {
    board
        .scenes
        .iter()
        .enumerate()
        .filter_map(|(i, scene)| {
            scene.selected_image().map(|image| ArchiveEntry {
                file_name: format!("scene_{}_selected.{}", i + 1, image.extension()),
                image,
            })
        })
        .collect()
}

pub fn build_archive(board: &Storyboard) -> Result<Vec<u8>> {
    let entries = selected_entries(board);
    if entries.is_empty() {
        return Err(WizardError::NothingSelected.into());
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for entry in &entries {
        writer.start_file(entry.file_name.as_str(), options)?;
        writer.write_all(&entry.image.data)?;
    }
    let cursor = writer.finish()?;
    log::info!("Packed {} images into archive", entries.len());
    Ok(cursor.into_inner())
}

/// Name for saving a single candidate: `scene_3_B.png` is the second image of scene 3.
pub fn candidate_file_name(scene_number: usize, slot: usize, image: &InlineImage) -> String {
    format!("scene_{}_{}.{}", scene_number, slot_label(slot), image.extension())
}

/// Letter shown for a 0-based candidate index.
pub fn slot_label(slot: usize) -> char {
    (b'A' + (slot % 26) as u8) as char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{ImageSlot, Scene};
    use std::io::Read;

    fn board() -> Storyboard {
        let mut scenes: Vec<Scene> = (0..3).map(|i| Scene::new(i, "t", "d")).collect();
        scenes[0].replace_images(vec![
            ImageSlot::Image(InlineImage::new("image/png", b"first-a".to_vec())),
            ImageSlot::Image(InlineImage::new("image/png", b"first-b".to_vec())),
        ]);
        scenes[2].replace_images(vec![
            ImageSlot::Empty,
            ImageSlot::Image(InlineImage::new("image/jpeg", b"third-b".to_vec())),
        ]);
        Storyboard {
            characters: vec![],
            scenes,
        }
    }

    #[test]
    fn test_nothing_selected_is_refused() {
        let err = build_archive(&board()).unwrap_err();
        assert_eq!(err.downcast_ref::<WizardError>(), Some(&WizardError::NothingSelected));
    }

    #[test]
    fn test_archive_holds_selected_images_by_position() -> Result<()> {
        let mut board = board();
        board.scenes[0].select(1)?;
        board.scenes[2].select(1)?;

        let names: Vec<_> = selected_entries(&board).into_iter().map(|e| e.file_name).collect();
        assert_eq!(names, ["scene_1_selected.png", "scene_3_selected.jpg"]);

        let bytes = build_archive(&board)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        assert_eq!(archive.len(), 2);

        let mut content = Vec::new();
        archive.by_name("scene_1_selected.png")?.read_to_end(&mut content)?;
        assert_eq!(content, b"first-b");

        content.clear();
        archive.by_name("scene_3_selected.jpg")?.read_to_end(&mut content)?;
        assert_eq!(content, b"third-b");
        Ok(())
    }

    #[test]
    fn test_candidate_names() {
        let png = InlineImage::new("image/png", vec![]);
        assert_eq!(candidate_file_name(3, 1, &png), "scene_3_B.png");
        assert_eq!(slot_label(0), 'A');
    }
}
