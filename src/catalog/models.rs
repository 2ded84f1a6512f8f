//! Catalog Domain Models
//!
//! Categories with their facet definitions, products, the filter state that
//! drives category browsing, and the search request/response exchanged with
//! the remote catalog.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

// =============================================================================
// Constants
// =============================================================================

/// Number of products requested per page of category results.
pub const PAGE_SIZE: u32 = 12;

// =============================================================================
// Filter Enums
// =============================================================================

/// Product condition. Encoded in URLs by its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Condition {
    New,
    Used,
    LikeNew,
}

impl Condition {
    pub const fn index(self) -> u8 {
        match self {
            Self::New => 0,
            Self::Used => 1,
            Self::LikeNew => 2,
        }
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::New),
            1 => Some(Self::Used),
            2 => Some(Self::LikeNew),
            _ => None,
        }
    }
}

/// Stock filter. Absence of a value means "any".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

impl StockStatus {
    pub const fn index(self) -> u8 {
        match self {
            Self::InStock => 0,
            Self::OutOfStock => 1,
        }
    }

    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::InStock),
            1 => Some(Self::OutOfStock),
            _ => None,
        }
    }
}

/// Result ordering offered on category pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Featured,
    Newest,
    PriceLow,
    PriceHigh,
    Rating,
}

impl SortOrder {
    /// URL token for this ordering.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Featured => "featured",
            Self::Newest => "newest",
            Self::PriceLow => "price-low",
            Self::PriceHigh => "price-high",
            Self::Rating => "rating",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "featured" => Some(Self::Featured),
            "newest" => Some(Self::Newest),
            "price-low" => Some(Self::PriceLow),
            "price-high" => Some(Self::PriceHigh),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }
}

// =============================================================================
// Categories and Facets
// =============================================================================

/// How many values of a facet may be selected at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacetKind {
    #[default]
    Multi,
    /// Radio-style: at most one value selected.
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// A named product attribute (e.g. "Color") usable as a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: FacetKind,
    #[serde(default)]
    pub values: Vec<FacetValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub facets: Vec<Facet>,
}

impl Category {
    /// Maps every facet value id to the id of the facet that owns it.
    pub fn facet_owners(&self) -> HashMap<&str, &str> {
        self.facets
            .iter()
            .flat_map(|facet| {
                facet
                    .values
                    .iter()
                    .map(move |value| (value.id.as_str(), facet.id.as_str()))
            })
            .collect()
    }

    pub fn facet(&self, facet_id: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.id == facet_id)
    }
}

/// A product as returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Captures any extra fields (e.g., rating, badges) dynamically
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

// =============================================================================
// Filter State
// =============================================================================

/// An attribute filter: a facet value together with the facet that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetFilter {
    pub facet_id: String,
    pub value_id: String,
}

impl FacetFilter {
    pub fn new(facet_id: impl Into<String>, value_id: impl Into<String>) -> Self {
        Self {
            facet_id: facet_id.into(),
            value_id: value_id.into(),
        }
    }
}

/// Active product-search constraints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    pub brand_ids: BTreeSet<String>,
    pub category_ids: BTreeSet<String>,
    pub condition: BTreeSet<Condition>,
    pub stock_status: Option<StockStatus>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub facet_filters: BTreeSet<FacetFilter>,
}

impl FilterState {
    /// Default state for a category page: only the category itself.
    pub fn for_category(category_id: impl Into<String>) -> Self {
        Self {
            category_ids: BTreeSet::from([category_id.into()]),
            ..Self::default()
        }
    }
}

/// Everything decoded from a category URL: filters plus paging and order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseState {
    pub filters: FilterState,
    pub page: u32,
    pub sort: SortOrder,
}

impl BrowseState {
    pub fn new(filters: FilterState) -> Self {
        Self {
            filters,
            page: 1,
            sort: SortOrder::default(),
        }
    }
}

// =============================================================================
// Remote Search
// =============================================================================

/// Numeric range on a facet, e.g. screen size between 13 and 15.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetRange {
    pub facet_id: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Filter object sent to the search endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    #[serde(flatten)]
    pub state: FilterState,
    pub facet_ranges: Vec<FacetRange>,
    pub searches: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub filter: SearchFilter,
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

impl From<&BrowseState> for SearchRequest {
    fn from(state: &BrowseState) -> Self {
        Self {
            filter: SearchFilter {
                state: state.filters.clone(),
                ..SearchFilter::default()
            },
            page: state.page,
            page_size: PAGE_SIZE,
            sort: state.sort,
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    #[serde(default)]
    pub items: Vec<Product>,
    #[serde(default)]
    pub total_count: u64,
}
