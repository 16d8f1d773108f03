//! Navigation menu returned by applications for navigation requests.

use pagewire_protocol::{MenuLocation, Navigation};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MenuError {
    #[error("navigation menu must contain at least one item")]
    NoItems,

    #[error("menu item must contain at least one entry")]
    EmptyItem,

    #[error("navigation entry {0} must not be blank")]
    BlankField(&'static str),

    #[error("more than one default navigation entry ('{first}' and '{second}')")]
    DuplicateDefault { first: String, second: String },
}

/// A single page link in the menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEntry {
    page: String,
    title: String,
    icon: Option<String>,
    is_default: bool,
}

impl NavigationEntry {
    pub fn new(page: impl Into<String>, title: impl Into<String>) -> Result<Self, MenuError> {
        let page = page.into();
        let title = title.into();
        if page.trim().is_empty() {
            return Err(MenuError::BlankField("page"));
        }
        if title.trim().is_empty() {
            return Err(MenuError::BlankField("title"));
        }
        Ok(Self {
            page,
            title,
            icon: None,
            is_default: false,
        })
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Mark this entry as the page shown when none is requested.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }
}

/// A group of entries with an optional section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    header: Option<String>,
    entries: Vec<NavigationEntry>,
}

impl MenuItem {
    pub fn new(header: Option<String>, entries: Vec<NavigationEntry>) -> Result<Self, MenuError> {
        if entries.is_empty() {
            return Err(MenuError::EmptyItem);
        }
        Ok(Self { header, entries })
    }

    pub fn entries(&self) -> &[NavigationEntry] {
        &self.entries
    }
}

/// The full menu. At most one entry across all items may be the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationMenu {
    location: MenuLocation,
    items: Vec<MenuItem>,
}

impl NavigationMenu {
    pub fn new(location: MenuLocation, items: Vec<MenuItem>) -> Result<Self, MenuError> {
        if items.is_empty() {
            return Err(MenuError::NoItems);
        }

        let mut default_page: Option<&str> = None;
        for entry in items.iter().flat_map(|item| item.entries.iter()) {
            if !entry.is_default {
                continue;
            }
            if let Some(first) = default_page {
                return Err(MenuError::DuplicateDefault {
                    first: first.to_string(),
                    second: entry.page.clone(),
                });
            }
            default_page = Some(&entry.page);
        }

        Ok(Self { location, items })
    }

    /// A sidebar menu with a single unlabeled item.
    pub fn sidebar(entries: Vec<NavigationEntry>) -> Result<Self, MenuError> {
        Self::new(MenuLocation::Sidebar, vec![MenuItem::new(None, entries)?])
    }

    pub fn location(&self) -> MenuLocation {
        self.location
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Page of the default entry, if one is marked.
    pub fn default_page(&self) -> Option<&str> {
        self.items
            .iter()
            .flat_map(|item| item.entries.iter())
            .find(|entry| entry.is_default)
            .map(|entry| entry.page.as_str())
    }

    pub fn to_navigation(&self) -> Navigation {
        Navigation {
            location: self.location,
            items: self
                .items
                .iter()
                .map(|item| pagewire_protocol::MenuItem {
                    header: item.header.clone(),
                    entries: item
                        .entries
                        .iter()
                        .map(|entry| pagewire_protocol::NavigationEntry {
                            page: entry.page.clone(),
                            title: entry.title.clone(),
                            icon: entry.icon.clone(),
                            is_default: entry.is_default,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
