//! Tells playlist links from single-video links.

use regex::Regex;

/// What a user-supplied link or id points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A playlist, by playlist id.
    Playlist(String),
    /// One video, by media id.
    SingleItem(String),
    /// Neither.
    Invalid,
}

const VIDEO_ID: &str = r"^[A-Za-z0-9_-]{11}$";
const PLAYLIST_ID: &str = r"^(?:PL|UU|OL|RD|LL|FL|UL|PU)[A-Za-z0-9_-]*$";
const HOST: &str =
    r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com|youtube-nocookie\.com|youtu\.be)(/[^?#]*)?(\?[^#]*)?";

fn captures(pattern: &str, haystack: &str) -> Option<Vec<Option<String>>> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(haystack)?;

    Some(
        caps.iter()
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect(),
    )
}

fn is_match(pattern: &str, haystack: &str) -> bool {
    captures(pattern, haystack).is_some()
}

fn query_param(query: &str, name: &str) -> Option<String> {
    let pattern = format!(r"[?&]{}=([A-Za-z0-9_-]+)", regex::escape(name));
    captures(&pattern, query)?.into_iter().nth(1).flatten()
}

fn video_id(candidate: &str) -> Option<String> {
    is_match(VIDEO_ID, candidate).then(|| candidate.to_string())
}

/// Prefixes `https://` to inputs that carry no scheme.
pub fn normalize(input: &str) -> String {
    let input = input.trim();
    let lowered = input.to_ascii_lowercase();

    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    }
}

/// Classifies a bare id or a YouTube URL.
pub fn classify(input: &str) -> Target {
    let input = input.trim();
    if input.is_empty() {
        return Target::Invalid;
    }

    if let Some(id) = video_id(input) {
        return Target::SingleItem(id);
    }
    if input.len() >= 2 && is_match(PLAYLIST_ID, input) {
        return Target::Playlist(input.to_string());
    }

    let url = normalize(input);
    let Some(groups) = captures(HOST, &url) else {
        return Target::Invalid;
    };
    let path = groups.get(1).cloned().flatten().unwrap_or_default();
    let query = groups.get(2).cloned().flatten().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let is_short_host = url
        .split("://")
        .nth(1)
        .is_some_and(|rest| rest.starts_with("youtu.be"));

    let single = match (is_short_host, segments.as_slice()) {
        (true, [id, ..]) => video_id(id),
        (false, ["shorts" | "embed" | "live" | "v", id, ..]) => video_id(id),
        (false, ["watch"]) => query_param(&query, "v").and_then(|id| video_id(&id)),
        _ => None,
    };
    if let Some(id) = single {
        return Target::SingleItem(id);
    }

    match segments.as_slice() {
        ["playlist"] | ["watch"] => query_param(&query, "list")
            .map(Target::Playlist)
            .unwrap_or(Target::Invalid),
        _ => Target::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(id: &str) -> Target {
        Target::SingleItem(id.to_string())
    }

    fn playlist(id: &str) -> Target {
        Target::Playlist(id.to_string())
    }

    #[test]
    fn bare_ids() {
        assert_eq!(classify("dQw4w9WgXcQ"), single("dQw4w9WgXcQ"));
        assert_eq!(
            classify("PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI"),
            playlist("PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI")
        );
        assert_eq!(classify("LL"), playlist("LL"));
        assert_eq!(classify("short"), Target::Invalid);
    }

    #[test]
    fn watch_urls() {
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            single("dQw4w9WgXcQ")
        );
        assert_eq!(
            classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLabc&index=2"),
            single("dQw4w9WgXcQ")
        );
        assert_eq!(
            classify("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ"),
            single("dQw4w9WgXcQ")
        );
        assert_eq!(
            classify("https://www.youtube.com/watch?list=PLabc123"),
            playlist("PLabc123")
        );
    }

    #[test]
    fn playlist_urls() {
        assert_eq!(
            classify("https://www.youtube.com/playlist?list=PLabc_123-x"),
            playlist("PLabc_123-x")
        );
        assert_eq!(classify("https://www.youtube.com/playlist"), Target::Invalid);
    }

    #[test]
    fn short_forms() {
        assert_eq!(classify("https://youtu.be/dQw4w9WgXcQ?t=10"), single("dQw4w9WgXcQ"));
        assert_eq!(classify("https://www.youtube.com/shorts/dQw4w9WgXcQ"), single("dQw4w9WgXcQ"));
        assert_eq!(classify("https://www.youtube.com/embed/dQw4w9WgXcQ"), single("dQw4w9WgXcQ"));
        assert_eq!(classify("https://www.youtube.com/live/dQw4w9WgXcQ"), single("dQw4w9WgXcQ"));
    }

    #[test]
    fn scheme_less_inputs_are_normalized() {
        assert_eq!(normalize(" youtu.be/dQw4w9WgXcQ "), "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(normalize("HTTP://youtu.be/x"), "HTTP://youtu.be/x");
        assert_eq!(classify("www.youtube.com/watch?v=dQw4w9WgXcQ"), single("dQw4w9WgXcQ"));
    }

    #[test]
    fn other_inputs_are_invalid() {
        assert_eq!(classify(""), Target::Invalid);
        assert_eq!(classify("   "), Target::Invalid);
        assert_eq!(classify("https://vimeo.com/12345"), Target::Invalid);
        assert_eq!(classify("https://www.youtube.com/watch?v=tooshort"), Target::Invalid);
        assert_eq!(classify("https://www.youtube.com/@channel"), Target::Invalid);
    }
}
