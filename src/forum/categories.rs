//! Usage: Fixed board categories (slug sent to the API, label shown to users).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub slug: &'static str,
    pub label: &'static str,
}

pub const CATEGORIES: &[Category] = &[
    Category {
        slug: "basic",
        label: "워홀 기본 정보",
    },
    Category {
        slug: "jobs_housing",
        label: "일자리 & 숙소",
    },
    Category {
        slug: "guide",
        label: "생활 가이드",
    },
    Category {
        slug: "travel",
        label: "워홀 후기 & 여행",
    },
    Category {
        slug: "qna",
        label: "Q&A",
    },
];

pub fn find_category(slug: &str) -> Option<&'static Category> {
    let slug = slug.trim();
    CATEGORIES.iter().find(|c| c.slug == slug)
}

/// Label for a slug; unknown slugs are shown as-is.
pub fn category_label(slug: &str) -> &str {
    find_category(slug).map(|c| c.label).unwrap_or(slug)
}
