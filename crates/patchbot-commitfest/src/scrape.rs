//! Line-oriented scrapers for Commitfest and archive pages.
//!
//! The pages are rendered one table cell per line, which is what these
//! parsers rely on. Each returns whatever it could recognize and never
//! fails on unexpected markup.

use chrono::{DateTime, NaiveDateTime, Utc};
use patchbot_core::{Author, CommitfestId, SubmissionId, SubmissionListing, SubmissionStatus};
use patchbot_core::resolver::PatchMessage;
use regex::Regex;
use std::sync::LazyLock;

static CURRENT_COMMITFEST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a href="/([0-9]+)/">[0-9]+-[0-9]+</a> \((Open|In Progress) "#).unwrap()
});

static SUBMISSION_LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href="([0-9]+)/">([^<]+)</a>"#).unwrap());

static STATUS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<td><span class="label label-[^"]*">([^<]+)</span></td>"#).unwrap()
});

static AUTHORS_CELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<td>([^<]*)</td>").unwrap());

static AUTHOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*) +\(([^)]*)\)").unwrap());

static DATE_CELL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<td style="white-space: nowrap;">(.*)<br/>(.*)</td>"#).unwrap());

static LATEST_THREAD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Latest at <a href="[^"]*/message-id/([^"]+)">(2[^<]+)"#).unwrap()
});

static LATEST_ATTACHMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Latest attachment .* <button type="button" "#).unwrap());

static ATTACHMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a href="(/message-id/attachment/[^"]*\.(?:diff|diff\.gz|patch|patch\.gz|tar\.gz|tgz|tar\.bz2|zip))">"#,
    )
    .unwrap()
});

static MESSAGE_ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<td><a href="/message-id/[^"]+">([^"]+)</a></td>"#).unwrap());

/// Id of the commitfest currently open or in progress.
///
/// The front page lists several; the last matching one wins.
pub fn parse_current_commitfest(html: &str) -> Option<CommitfestId> {
    html.lines()
        .filter_map(|line| CURRENT_COMMITFEST_REGEX.captures(line))
        .filter_map(|caps| caps[1].parse::<i32>().ok())
        .last()
        .map(CommitfestId)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingCell {
    Other,
    Version,
    Authors,
    LatestEmail,
}

struct PendingRow {
    submission_id: SubmissionId,
    title: String,
    status: SubmissionStatus,
    authors: Vec<Author>,
}

/// Parse a commitfest listing page.
///
/// Each row is: title link, status label, version, authors, reviewers, and
/// two date cells of which the second is the latest email.
pub fn parse_listing(html: &str) -> Vec<SubmissionListing> {
    let mut listings = Vec::new();
    let mut row: Option<PendingRow> = None;
    let mut expect = ListingCell::Other;

    for line in html.lines() {
        if let Some(caps) = SUBMISSION_LINK_REGEX.captures(line) {
            if let Ok(id) = caps[1].parse::<i32>() {
                row = Some(PendingRow {
                    submission_id: SubmissionId(id),
                    title: unescape_html(&caps[2]),
                    status: SubmissionStatus::Other(String::new()),
                    authors: Vec::new(),
                });
            }
        }

        match expect {
            ListingCell::Version => {
                expect = ListingCell::Authors;
                continue;
            }
            ListingCell::Authors => {
                expect = ListingCell::Other;
                if let Some(row) = row.as_mut() {
                    row.authors = parse_authors(line);
                }
                continue;
            }
            ListingCell::LatestEmail => {
                expect = ListingCell::Other;
                if let Some(caps) = DATE_CELL_REGEX.captures(line) {
                    if let Some(done) = row.take() {
                        listings.push(SubmissionListing {
                            submission_id: done.submission_id,
                            title: done.title,
                            status: done.status,
                            authors: done.authors,
                            last_email_time: parse_email_time(&caps[1], &caps[2]),
                        });
                    }
                }
            }
            ListingCell::Other => {}
        }

        if let Some(caps) = STATUS_REGEX.captures(line) {
            if let Some(row) = row.as_mut() {
                row.status = SubmissionStatus::from(unescape_html(&caps[1]).as_str());
            }
            expect = ListingCell::Version;
            continue;
        }

        if DATE_CELL_REGEX.is_match(line) {
            expect = ListingCell::LatestEmail;
            continue;
        }

        expect = ListingCell::Other;
    }

    listings
}

/// Parse an authors cell: `Display Name (username), ...`.
///
/// Entries without a parenthesized username are skipped.
pub fn parse_authors(line: &str) -> Vec<Author> {
    let Some(caps) = AUTHORS_CELL_REGEX.captures(line) else {
        return Vec::new();
    };

    let cell = unescape_html(&caps[1]);
    cell.split(", ")
        .filter_map(|entry| AUTHOR_REGEX.captures(entry))
        .map(|m| Author::new(m[2].to_string(), m[1].to_string()))
        .collect()
}

/// Join the date and time halves of a date cell. Blank cells mean no email.
pub fn parse_email_time(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let joined = format!("{} {}", date.trim(), time.trim());
    let joined = joined.trim();
    if joined.is_empty() {
        return None;
    }

    ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(joined, format).ok())
        .map(|naive| naive.and_utc())
}

/// Message id of the thread with the newest message, among the threads of
/// a submission page that show an attachment.
///
/// The id is returned as it appears in the link, percent-decoded.
pub fn parse_latest_thread(html: &str) -> Option<String> {
    let mut candidates: Vec<(String, String)> = Vec::new();
    let mut candidate: Option<(String, String)> = None;

    for line in html.lines() {
        if let Some(caps) = LATEST_THREAD_REGEX.captures(line) {
            let message_id = urlencoding::decode(&caps[1])
                .map(|id| id.into_owned())
                .unwrap_or_else(|_| caps[1].to_string());
            candidate = Some((caps[2].trim().to_string(), message_id));
        }
        if LATEST_ATTACHMENT_REGEX.is_match(line) {
            if let Some(found) = candidate.clone() {
                candidates.push(found);
            }
        }
    }

    // Timestamps are ISO formatted, so the string order is the time order.
    candidates.sort();
    candidates.pop().map(|(_, message_id)| message_id)
}

/// Newest message of a flat thread that has patch attachments.
///
/// Attachment links are returned as the site-relative paths found in the
/// page. Attachments shown before the first message row are ignored.
pub fn parse_latest_patch_message(html: &str) -> Option<PatchMessage> {
    let mut selected: Option<PatchMessage> = None;
    let mut current: Option<PatchMessage> = None;

    for line in html.lines() {
        if let Some(caps) = ATTACHMENT_REGEX.captures(line) {
            if let Some(message) = current.as_mut() {
                message.attachments.push(unescape_html(&caps[1]));
                selected = Some(message.clone());
            }
        }
        if let Some(caps) = MESSAGE_ROW_REGEX.captures(line) {
            current = Some(PatchMessage {
                message_id: unescape_html(&caps[1]),
                attachments: Vec::new(),
            });
        }
    }

    selected
}

/// Decode the handful of entities the sites emit in text and attributes.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FRONT_PAGE: &str = r#"
<ul>
<li><a href="/51/">2024-11</a> (Closed - 2024-12-01 - 2024-12-31)</li>
<li><a href="/52/">2025-01</a> (In Progress - 2025-01-01 - 2025-01-31)</li>
<li><a href="/53/">2025-03</a> (Open - 2025-03-01 - 2025-03-31)</li>
</ul>
"#;

    const LISTING: &str = r#"
<tr>
<td><a href="4101/">Fix &amp; improve vacuum</a></td>
<td><span class="label label-default">Needs review</span></td>
<td>18</td>
<td>Jane Doe (jdoe), Bob Smith (bsmith)</td>
<td>Alice (alice)</td>
<td style="white-space: nowrap;">2025-01-02<br/>10:00</td>
<td style="white-space: nowrap;">2025-02-03<br/>11:22</td>
</tr>
<tr>
<td><a href="4102/">Parallel foo</a></td>
<td><span class="label label-success">Committed</span></td>
<td></td>
<td>No Username, Carol (carol)</td>
<td></td>
<td style="white-space: nowrap;">2025-01-05<br/>09:00</td>
<td style="white-space: nowrap;"><br/></td>
</tr>
"#;

    #[test]
    fn test_current_commitfest_takes_last_open_or_in_progress() {
        assert_eq!(parse_current_commitfest(FRONT_PAGE), Some(CommitfestId(53)));
        assert_eq!(parse_current_commitfest("<p>nothing</p>"), None);
    }

    #[test]
    fn test_listing_rows() {
        let rows = parse_listing(LISTING);
        assert_eq!(rows.len(), 2);

        let first = &rows[0];
        assert_eq!(first.submission_id, SubmissionId(4101));
        assert_eq!(first.title, "Fix & improve vacuum");
        assert_eq!(first.status, SubmissionStatus::NeedsReview);
        assert_eq!(
            first.authors,
            vec![Author::new("jdoe", "Jane Doe"), Author::new("bsmith", "Bob Smith")]
        );
        assert_eq!(
            first.last_email_time,
            Some(Utc.with_ymd_and_hms(2025, 2, 3, 11, 22, 0).unwrap())
        );

        let second = &rows[1];
        assert_eq!(second.status, SubmissionStatus::Committed);
        assert_eq!(second.authors, vec![Author::new("carol", "Carol")]);
        assert_eq!(second.last_email_time, None);
    }

    #[test]
    fn test_malformed_authors_are_skipped() {
        assert!(parse_authors("<td></td>").is_empty());
        assert!(parse_authors("no cell here").is_empty());
    }

    const SUBMISSION_PAGE: &str = r#"
<dt>Emails</dt>
<dd>First at <a href="https://archive.example.org/message-id/old%40mail">2024-10-01 10:00:00</a>
Latest at <a href="https://archive.example.org/message-id/oldlatest%40mail">2024-12-01 10:00:00</a>
Latest attachment (v1.patch) at 2024-10-01 <button type="button" class="btn">Show</button>
</dd>
<dd>First at <a href="https://archive.example.org/message-id/a%40mail">2025-01-01 10:00:00</a>
Latest at <a href="https://archive.example.org/message-id/newlatest%40mail">2025-02-01 08:00:00</a>
Latest attachment (v7.patch) at 2025-01-30 <button type="button" class="btn">Show</button>
</dd>
<dd>Latest at <a href="https://archive.example.org/message-id/noattach%40mail">2025-03-01 08:00:00</a>
</dd>
"#;

    #[test]
    fn test_latest_thread_needs_an_attachment() {
        assert_eq!(
            parse_latest_thread(SUBMISSION_PAGE).as_deref(),
            Some("newlatest@mail")
        );
        assert_eq!(parse_latest_thread("<p>no threads</p>"), None);
    }

    const THREAD: &str = r#"
<table>
<tr><th>Message-ID:</th><td><a href="/message-id/first%40mail">first@mail</a></td></tr>
<a href="/message-id/attachment/100/v1-0001-a.patch">v1-0001-a.patch</a>
<tr><th>Message-ID:</th><td><a href="/message-id/second%40mail">second@mail</a></td></tr>
<a href="/message-id/attachment/200/v2-0001-a.patch">v2-0001-a.patch</a>
<a href="/message-id/attachment/201/v2-0002-b.patch">v2-0002-b.patch</a>
<tr><th>Message-ID:</th><td><a href="/message-id/third%40mail">third@mail</a></td></tr>
<a href="/message-id/attachment/300/screenshot.png">screenshot.png</a>
</table>
"#;

    #[test]
    fn test_latest_patch_message_skips_messages_without_patches() {
        let message = parse_latest_patch_message(THREAD).unwrap();
        assert_eq!(message.message_id, "second@mail");
        assert_eq!(
            message.attachments,
            vec![
                "/message-id/attachment/200/v2-0001-a.patch",
                "/message-id/attachment/201/v2-0002-b.patch",
            ]
        );
    }

    #[test]
    fn test_thread_without_patches() {
        let html = r#"<td><a href="/message-id/x%40mail">x@mail</a></td>"#;
        assert_eq!(parse_latest_patch_message(html), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape_html("a &amp;lt; b"), "a &lt; b");
        assert_eq!(unescape_html("&quot;x&quot;"), "\"x\"");
    }
}
