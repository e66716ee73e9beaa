use serde::{Deserialize, Serialize};

/// Last.fm API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: u32,
    pub message: String,
}

/// Response from `artist.getInfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistInfoResponse {
    pub artist: ArtistInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistInfo {
    pub name: String,
    #[serde(default)]
    pub mbid: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub bio: Option<ArtistBio>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistBio {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ArtistBio {
    /// Full text if present, else the summary, with Last.fm's trailing link removed
    pub fn text(&self) -> Option<String> {
        [self.content.as_deref(), self.summary.as_deref()]
            .into_iter()
            .flatten()
            .map(strip_read_more)
            .find(|text| !text.is_empty())
    }
}

/// Remove the `<a href="...">Read more on Last.fm</a>` suffix and trim
pub fn strip_read_more(text: &str) -> String {
    let cut = text.find("<a href=\"https://www.last.fm").unwrap_or(text.len());
    text[..cut].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_artist_info() {
        let json = r##"{
            "artist": {
                "name": "Cher",
                "mbid": "bfcc6d75-a6a5-4bc6-8282-47aec8531818",
                "url": "https://www.last.fm/music/Cher",
                "image": [{"#text": "", "size": "small"}],
                "bio": {
                    "published": "01 Jan 2006",
                    "summary": "Cher is an American singer. <a href=\"https://www.last.fm/music/Cher\">Read more on Last.fm</a>",
                    "content": ""
                }
            }
        }"##;

        let response: ArtistInfoResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.artist.name, "Cher");
        assert_eq!(
            response.artist.bio.unwrap().text().as_deref(),
            Some("Cher is an American singer.")
        );
    }

    #[test]
    fn test_bio_without_text() {
        let bio = ArtistBio {
            summary: Some(" <a href=\"https://www.last.fm/music/X\">Read more on Last.fm</a>".into()),
            content: None,
        };
        assert_eq!(bio.text(), None);
    }
}
