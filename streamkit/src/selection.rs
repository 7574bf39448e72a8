//! Flattens an [`EncodingCatalog`] into one numbered menu and resolves user tokens back into encodings.
//!
//! Numeric tokens `1..N` address the combined encodings followed by the video-only ones;
//! audio-only encodings are addressed separately as `A1..Ak`. The `A` prefix is reserved
//! and case-insensitive. Video-only entries are only addressable when there is audio to pair
//! them with: the pair always uses the highest-bitrate audio track.

use crate::error::{Error, Result};
use crate::model::{EncodingCatalog, EncodingDescriptor};
use crate::utils::format_file_size;

/// What a resolved user choice asks the pipeline to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionResult {
    /// No explicit choice: the caller should use [`SelectionMenu::resolve_highest`].
    UseHighest,
    /// Download one encoding as is (combined or audio-only).
    Direct(EncodingDescriptor),
    /// Download a video-only and an audio-only encoding and merge them.
    MergePair {
        /// The video track.
        video: EncodingDescriptor,
        /// The audio track.
        audio: EncodingDescriptor,
    },
}

impl SelectionResult {
    /// Whether this choice needs a muxer.
    pub fn requires_merge(&self) -> bool {
        matches!(self, SelectionResult::MergePair { .. })
    }
}

/// One addressable line of the menu.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuEntry {
    /// The token the user types, e.g. `3` or `A1`.
    pub token: String,
    /// What the token resolves to.
    pub choice: SelectionResult,
    /// A one-line description for display.
    pub label: String,
}

/// A view over a catalog that assigns stable tokens to its encodings.
#[derive(Debug, Clone, Copy)]
pub struct SelectionMenu<'a> {
    catalog: &'a EncodingCatalog,
}

impl<'a> SelectionMenu<'a> {
    /// Builds the menu for a catalog.
    pub fn new(catalog: &'a EncodingCatalog) -> Self {
        Self { catalog }
    }

    fn best_audio(&self) -> Option<&'a EncodingDescriptor> {
        self.catalog.audio_only().first()
    }

    fn addressable_video(&self) -> &'a [EncodingDescriptor] {
        if self.catalog.audio_only().is_empty() {
            &[]
        } else {
            self.catalog.video_only()
        }
    }

    /// The number of numeric tokens the menu assigns.
    pub fn numeric_len(&self) -> usize {
        self.catalog.combined().len() + self.addressable_video().len()
    }

    /// The number of video-only encodings left out because there is no audio to pair them with.
    pub fn unaddressable_video_count(&self) -> usize {
        self.catalog.video_only().len() - self.addressable_video().len()
    }

    fn pair_with_best_audio(&self, video: &EncodingDescriptor) -> Option<SelectionResult> {
        self.best_audio().map(|audio| SelectionResult::MergePair {
            video: video.clone(),
            audio: audio.clone(),
        })
    }

    /// Lists every addressable entry: numeric tokens first, then `A`-tokens.
    pub fn render(&self) -> Vec<MenuEntry> {
        let mut entries = Vec::with_capacity(self.numeric_len() + self.catalog.audio_only().len());
        let mut index = 1;

        for encoding in self.catalog.combined() {
            entries.push(MenuEntry {
                token: index.to_string(),
                choice: SelectionResult::Direct(encoding.clone()),
                label: format!("{} (video+audio)", encoding),
            });
            index += 1;
        }

        for video in self.addressable_video() {
            let Some(choice) = self.pair_with_best_audio(video) else {
                continue;
            };
            let estimated = video.size + self.best_audio().map_or(0, |a| a.size);

            entries.push(MenuEntry {
                token: index.to_string(),
                label: format!(
                    "{} | {} | ~{} (auto-merged)",
                    video.quality_label(),
                    video.container,
                    format_file_size(estimated)
                ),
                choice,
            });
            index += 1;
        }

        for (position, audio) in self.catalog.audio_only().iter().enumerate() {
            entries.push(MenuEntry {
                token: format!("A{}", position + 1),
                choice: SelectionResult::Direct(audio.clone()),
                label: format!("{} (audio only)", audio),
            });
        }

        entries
    }

    /// Resolves a user token.
    ///
    /// An empty (or blank) token means [`SelectionResult::UseHighest`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSelection`] for tokens outside the rendered range,
    /// malformed numbers (including a bare `A`), and video-only indices when no audio exists.
    pub fn resolve(&self, input: &str) -> Result<SelectionResult> {
        let token = input.trim();
        if token.is_empty() {
            return Ok(SelectionResult::UseHighest);
        }

        let invalid = || Error::InvalidSelection(token.to_string());

        if let Some(rest) = token.strip_prefix(['A', 'a']) {
            let position = parse_index(rest).ok_or_else(invalid)?;
            return self
                .catalog
                .audio_only()
                .get(position - 1)
                .map(|audio| SelectionResult::Direct(audio.clone()))
                .ok_or_else(invalid);
        }

        let index = parse_index(token).ok_or_else(invalid)?;
        let combined = self.catalog.combined();

        if index <= combined.len() {
            return Ok(SelectionResult::Direct(combined[index - 1].clone()));
        }

        self.addressable_video()
            .get(index - combined.len() - 1)
            .and_then(|video| self.pair_with_best_audio(video))
            .ok_or_else(invalid)
    }

    /// Picks the best achievable download.
    ///
    /// A video+audio merge is preferred whenever both families exist, then the best combined
    /// encoding, then the best audio-only one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoEncodingsAvailable`] when nothing is addressable.
    pub fn resolve_highest(&self) -> Result<SelectionResult> {
        if let Some(pair) = self
            .addressable_video()
            .first()
            .and_then(|video| self.pair_with_best_audio(video))
        {
            return Ok(pair);
        }

        self.catalog
            .combined()
            .first()
            .or_else(|| self.best_audio())
            .map(|encoding| SelectionResult::Direct(encoding.clone()))
            .ok_or(Error::NoEncodingsAvailable)
    }

    /// Resolves a token, treating an empty one as a request for the best download.
    pub fn resolve_or_highest(&self, input: &str) -> Result<SelectionResult> {
        match self.resolve(input)? {
            SelectionResult::UseHighest => self.resolve_highest(),
            choice => Ok(choice),
        }
    }
}

/// Parses a 1-based index made only of ASCII digits.
fn parse_index(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    digits.parse::<usize>().ok().filter(|index| *index > 0)
}
