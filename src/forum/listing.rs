//! Usage: Client-side search, pinned-aware pagination and related-post ordering for board lists.

use crate::forum::posts::Post;
use std::cmp::Ordering;
use std::str::FromStr;

pub const DEFAULT_PAGE_SIZE: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    All,
    Title,
    Content,
    Author,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::All => "all",
            SearchMode::Title => "title",
            SearchMode::Content => "content",
            SearchMode::Author => "author",
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(SearchMode::All),
            "title" => Ok(SearchMode::Title),
            "content" => Ok(SearchMode::Content),
            "author" => Ok(SearchMode::Author),
            other => Err(format!("SEC_INVALID_INPUT: unknown search mode: {other}")),
        }
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn matches(post: &Post, needle: &str, mode: SearchMode) -> bool {
    let title = || contains_folded(&post.title, needle);
    let content = || contains_folded(&post.content, needle);
    let author = || {
        post.author_name()
            .is_some_and(|name| contains_folded(&name, needle))
    };
    match mode {
        SearchMode::Title => title(),
        SearchMode::Content => content(),
        SearchMode::Author => author(),
        SearchMode::All => title() || content() || author(),
    }
}

/// Case-insensitive substring search. A blank query keeps every post.
pub fn filter_posts<'a>(posts: &'a [Post], query: &str, mode: SearchMode) -> Vec<&'a Post> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return posts.iter().collect();
    }
    posts
        .iter()
        .filter(|post| matches(post, &needle, mode))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLabel {
    /// Pinned post, shown as a notice without a number.
    Notice,
    /// Descending number among non-pinned posts; the newest gets the largest.
    Number(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRow<'a> {
    pub post: &'a Post,
    pub label: RowLabel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPage<'a> {
    pub page: usize,
    pub total_pages: usize,
    pub rows: Vec<PageRow<'a>>,
}

/// One page of a board list.
///
/// Page 1 holds every pinned post (capped at `page_size`) followed by as many
/// regular posts as still fit; later pages hold regular posts only. Input
/// order is kept within each group.
pub fn paginate(posts: &[Post], page: usize, page_size: usize) -> PostPage<'_> {
    paginate_refs(posts.iter().collect(), page, page_size)
}

/// [`paginate`] over already-borrowed posts, e.g. the output of [`filter_posts`].
pub fn paginate_refs(posts: Vec<&Post>, page: usize, page_size: usize) -> PostPage<'_> {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let (pinned, regular): (Vec<&Post>, Vec<&Post>) = posts.into_iter().partition(|p| p.is_pinned);

    let pinned_shown = pinned.len().min(page_size);
    let first_page_regular = (page_size - pinned_shown).min(regular.len());
    let remaining = regular.len() - first_page_regular;
    let total_pages = 1 + remaining.div_ceil(page_size);

    let (offset, take) = if page == 1 {
        (0, first_page_regular)
    } else {
        // Saturates so an absurd page number lands past the end as an empty page.
        let skipped = (page - 2).saturating_mul(page_size);
        (first_page_regular.saturating_add(skipped), page_size)
    };

    let regular_total = regular.len();
    let mut rows = Vec::new();
    if page == 1 {
        rows.extend(pinned.into_iter().take(pinned_shown).map(|post| PageRow {
            post,
            label: RowLabel::Notice,
        }));
    }
    rows.extend(
        regular
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(take)
            .map(|(index, post)| PageRow {
                post,
                label: RowLabel::Number(regular_total - index),
            }),
    );

    PostPage {
        page,
        total_pages,
        rows,
    }
}

fn compare_created_desc(a: &Post, b: &Post) -> Ordering {
    // ISO-8601 timestamps from one backend sort lexicographically.
    b.created_at
        .as_deref()
        .unwrap_or("")
        .cmp(a.created_at.as_deref().unwrap_or(""))
}

/// Other posts of the same board for a detail page: the current post is
/// dropped, pinned posts come first, then newest first.
pub fn related_posts(posts: &[Post], current_id: i64) -> Vec<&Post> {
    let mut related: Vec<&Post> = posts.iter().filter(|p| p.id != current_id).collect();
    related.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| compare_created_desc(a, b))
    });
    related
}
