use quick_xml::{events::Event, Reader};

use super::Recording;
use crate::error::ParseError;

/// What one `QueryContainer` round trip yielded.
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub total_items: Option<u64>,
    pub recordings: Vec<Recording>,
}

/// Text collected for the `Item` currently being read.
#[derive(Debug, Default)]
struct ItemFields {
    title: Option<String>,
    size: Option<String>,
    url: Option<String>,
    episode_title: Option<String>,
}
impl ItemFields {
    /// `rel_path` is the element path below `Item`.
    fn slot(&mut self, rel_path: &[String]) -> Option<&mut Option<String>> {
        let rel_path = rel_path.iter().map(String::as_str).collect::<Vec<_>>();

        match rel_path.as_slice() {
            ["Details", "Title"] => Some(&mut self.title),
            ["Details", "SourceSize"] => Some(&mut self.size),
            ["Details", "EpisodeTitle"] => Some(&mut self.episode_title),
            ["Links", "Content", "Url"] => Some(&mut self.url),
            _ => None,
        }
    }

    fn into_recording(self, index: usize) -> Result<Recording, ParseError> {
        let title = required(self.title, index, "Title")?;
        let size = required(self.size, index, "SourceSize")?
            .parse::<u64>()
            .map_err(|_| ParseError::MalformedRecord {
                index,
                field: "SourceSize",
            })?;
        let url = required(self.url, index, "Url")?;
        let episode_title = self
            .episode_title
            .map(|x| x.trim().to_string())
            .filter(|x| !x.is_empty());

        Ok(Recording {
            size,
            title,
            url,
            episode_title,
        })
    }
}

fn required(value: Option<String>, index: usize, field: &'static str) -> Result<String, ParseError> {
    value
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .ok_or(ParseError::MalformedRecord { index, field })
}

fn append(slot: &mut Option<String>, text: &str) {
    slot.get_or_insert_with(String::new).push_str(text);
}

/// Decode one page of the Now Playing container.
///
/// Elements are matched by local name, so the calypso namespace may be the
/// default namespace or bound to a prefix. `TotalItems` is only read when
/// `expect_total` is set; the device repeats it on every page but only the
/// first page of a listing is authoritative.
pub fn parse_page(raw: &[u8], expect_total: bool) -> Result<ParsedPage, ParseError> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| ParseError::Protocol(format!("response is not valid UTF-8: {e}")))?;
    let mut reader = Reader::from_str(text);

    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;
    // Depth of the open `Item` element and the fields gathered for it.
    let mut item: Option<(usize, ItemFields)> = None;
    let mut total_text: Option<String> = None;
    let mut total_closed = false;
    let mut page = ParsedPage::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::Protocol(format!(
                "invalid XML at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(e) => {
                saw_root = true;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if item.is_none() && name == "Item" {
                    item = Some((path.len(), ItemFields::default()));
                }
                path.push(name);
            }

            Event::End(_) => {
                let name = path.pop();
                if item.is_none() && total_text.is_some() && name.as_deref() == Some("TotalItems") {
                    total_closed = true;
                }
                if let Some((depth, _)) = &item {
                    if *depth == path.len() {
                        if let Some((_, fields)) = item.take() {
                            let index = page.recordings.len();
                            page.recordings.push(fields.into_recording(index)?);
                        }
                    }
                }
            }

            Event::Empty(e) => {
                saw_root = true;
                if item.is_none() && e.local_name().as_ref() == b"Item" {
                    let index = page.recordings.len();
                    page.recordings
                        .push(ItemFields::default().into_recording(index)?);
                }
            }

            Event::Text(t) => {
                let t = t
                    .unescape()
                    .map_err(|e| ParseError::Protocol(format!("bad character data: {e}")))?;
                let total = (!total_closed).then_some(&mut total_text);
                collect_text(&path, item.as_mut(), total, &t);
            }

            Event::CData(c) => {
                let t = String::from_utf8_lossy(&c);
                let total = (!total_closed).then_some(&mut total_text);
                collect_text(&path, item.as_mut(), total, &t);
            }

            Event::Eof => break,

            _ => {}
        }
    }

    if !saw_root {
        return Err(ParseError::Protocol("empty response document".to_string()));
    }
    if !path.is_empty() {
        return Err(ParseError::Protocol(format!(
            "response document truncated inside <{}>",
            path.join("/")
        )));
    }

    if expect_total {
        page.total_items = total_text
            .map(|x| {
                let x = x.trim();
                x.parse::<u64>()
                    .map_err(|_| ParseError::Protocol(format!("TotalItems is not a count: {x:?}")))
            })
            .transpose()?;
    }

    Ok(page)
}

/// Route character data to the open item's field, or to `total` while the
/// first container-level `TotalItems` is open.
fn collect_text(
    path: &[String],
    item: Option<&mut (usize, ItemFields)>,
    total: Option<&mut Option<String>>,
    text: &str,
) {
    match item {
        Some((depth, fields)) => {
            if let Some(slot) = fields.slot(&path[*depth + 1..]) {
                append(slot, text);
            }
        }

        None => {
            if let Some(total) = total {
                if path.last().is_some_and(|x| x == "TotalItems") {
                    append(total, text);
                }
            }
        }
    }
}
