//! URL codec for category filter state.
//!
//! The URL query is the single source of truth for what a category page
//! shows. [`decode`] rebuilds a [`BrowseState`] from a query string and
//! [`encode`] produces the minimal query for a state; every filter action is
//! applied to a decoded state and re-encoded into a [`Navigation`].
//!
//! Query parameters:
//!
//! | key     | meaning                               |
//! |---------|---------------------------------------|
//! | `brand` | brand id, repeatable                  |
//! | `cond`  | condition index, repeatable           |
//! | `stock` | stock status index                    |
//! | `min`   | minimum price                         |
//! | `max`   | maximum price                         |
//! | `facet` | facet value id, repeatable            |
//! | `page`  | page number, default 1                |
//! | `sort`  | sort token, default `featured`        |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use url::form_urlencoded;

use super::models::{
    BrowseState, Category, Condition, Facet, FacetFilter, FacetKind, FilterState, SortOrder,
    StockStatus,
};

// =============================================================================
// Decode / Encode
// =============================================================================

/// Rebuilds the browse state of `category` from a URL query string.
///
/// Unknown keys and unparsable values are ignored. Facet value ids that no
/// facet of `category` owns are stale (left over from another category) and
/// are dropped. A single-choice facet keeps the first of its values.
pub fn decode(query: &str, category: &Category) -> BrowseState {
    let owners = category.facet_owners();
    let single: HashSet<&str> = category
        .facets
        .iter()
        .filter(|facet| facet.kind == FacetKind::Single)
        .map(|facet| facet.id.as_str())
        .collect();
    let mut state = BrowseState::new(FilterState::for_category(&category.id));
    let filters = &mut state.filters;

    let query = query.strip_prefix('?').unwrap_or(query);
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "brand" if !value.is_empty() => {
                filters.brand_ids.insert(value.into_owned());
            }
            "cond" => {
                if let Some(condition) = value.parse().ok().and_then(Condition::from_index) {
                    filters.condition.insert(condition);
                }
            }
            "stock" => {
                filters.stock_status = value.parse().ok().and_then(StockStatus::from_index);
            }
            "min" => filters.min_price = parse_price(&value),
            "max" => filters.max_price = parse_price(&value),
            "facet" => match owners.get(value.as_ref()) {
                Some(facet_id) => {
                    let taken = single.contains(facet_id)
                        && filters
                            .facet_filters
                            .iter()
                            .any(|f| f.facet_id == *facet_id && f.value_id != value);
                    if taken {
                        tracing::debug!(
                            facet_id = %facet_id,
                            value_id = %value,
                            "Dropping extra value of single-choice facet"
                        );
                    } else {
                        filters
                            .facet_filters
                            .insert(FacetFilter::new(*facet_id, value.as_ref()));
                    }
                }
                None => {
                    tracing::debug!(
                        category = %category.slug,
                        value_id = %value,
                        "Dropping stale facet value"
                    );
                }
            },
            "page" => {
                state.page = value.parse().ok().filter(|page| *page > 0).unwrap_or(1);
            }
            "sort" => state.sort = SortOrder::from_token(&value).unwrap_or_default(),
            _ => {}
        }
    }

    state
}

fn parse_price(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|price| price.is_finite())
}

/// Produces the query string for `state`, without a leading `?`.
///
/// Parameters equal to their implicit default (page 1, `featured`, empty
/// sets, absent bounds) are omitted. The category is carried by the path and
/// never encoded.
pub fn encode(state: &BrowseState) -> String {
    let filters = &state.filters;
    let mut query = form_urlencoded::Serializer::new(String::new());

    for brand in &filters.brand_ids {
        query.append_pair("brand", brand);
    }
    for condition in &filters.condition {
        query.append_pair("cond", &condition.index().to_string());
    }
    if let Some(stock) = filters.stock_status {
        query.append_pair("stock", &stock.index().to_string());
    }
    if let Some(min) = filters.min_price {
        query.append_pair("min", &min.to_string());
    }
    if let Some(max) = filters.max_price {
        query.append_pair("max", &max.to_string());
    }
    for facet in &filters.facet_filters {
        query.append_pair("facet", &facet.value_id);
    }
    if state.page != 1 {
        query.append_pair("page", &state.page.to_string());
    }
    if state.sort != SortOrder::Featured {
        query.append_pair("sort", state.sort.as_str());
    }

    query.finish()
}

/// Path of a category page.
pub fn category_path(slug: &str) -> String {
    format!("/categories/{slug}")
}

// =============================================================================
// Filter Actions
// =============================================================================

fn toggle<T: Ord>(set: &mut BTreeSet<T>, value: T) {
    if !set.remove(&value) {
        set.insert(value);
    }
}

impl BrowseState {
    pub fn toggle_brand(&mut self, brand_id: &str) {
        toggle(&mut self.filters.brand_ids, brand_id.to_string());
        self.page = 1;
    }

    pub fn toggle_condition(&mut self, condition: Condition) {
        toggle(&mut self.filters.condition, condition);
        self.page = 1;
    }

    /// Checkbox-style facet toggle.
    pub fn toggle_facet_value(&mut self, facet_id: &str, value_id: &str) {
        toggle(
            &mut self.filters.facet_filters,
            FacetFilter::new(facet_id, value_id),
        );
        self.page = 1;
    }

    /// Radio-style facet selection: clears every other value of `facet_id`
    /// before selecting `value_id`. Other facets are left untouched.
    pub fn set_facet_radio(&mut self, facet_id: &str, value_id: &str) {
        self.filters
            .facet_filters
            .retain(|filter| filter.facet_id != facet_id);
        self.filters
            .facet_filters
            .insert(FacetFilter::new(facet_id, value_id));
        self.page = 1;
    }

    /// Radio-style toggle: picking the selected value again clears the facet.
    pub fn toggle_facet_radio(&mut self, facet_id: &str, value_id: &str) {
        let filter = FacetFilter::new(facet_id, value_id);
        if self.filters.facet_filters.remove(&filter) {
            self.page = 1;
        } else {
            self.set_facet_radio(facet_id, value_id);
        }
    }

    pub fn set_stock(&mut self, stock: Option<StockStatus>) {
        self.filters.stock_status = stock;
        self.page = 1;
    }

    /// Sets both price bounds. `min > max` is passed through unchanged.
    pub fn set_price_range(&mut self, min: Option<f64>, max: Option<f64>) {
        self.filters.min_price = min.filter(|v| v.is_finite());
        self.filters.max_price = max.filter(|v| v.is_finite());
        self.page = 1;
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.page = 1;
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }
}

/// A user action on the category filter UI.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum FilterAction {
    ToggleBrand { brand_id: String },
    ToggleCondition { condition: Condition },
    ToggleFacetValue { facet_id: String, value_id: String },
    SetFacetRadio { facet_id: String, value_id: String },
    SetStock { stock: Option<StockStatus> },
    SetPriceRange { min: Option<f64>, max: Option<f64> },
    SetSort { sort: SortOrder },
    SetPage { page: u32 },
    ClearAll,
}

/// How the new location should enter browser history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    /// Replace the current entry; filter tweaks do not pile up in history.
    Replace,
    /// Push a new entry; used for page navigation.
    Push,
}

/// Where the client should navigate after a filter action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Navigation {
    pub location: String,
    pub mode: NavigationMode,
}

impl Navigation {
    fn to_state(category: &Category, state: &BrowseState, mode: NavigationMode) -> Self {
        let path = category_path(&category.slug);
        let query = encode(state);
        let location = if query.is_empty() {
            path
        } else {
            format!("{path}?{query}")
        };
        Self { location, mode }
    }
}

/// The facet `facet_id` of `category`, if it is the one owning `value_id`.
fn owning_facet<'a>(
    category: &'a Category,
    facet_id: &str,
    value_id: &str,
) -> Option<&'a Facet> {
    let owner = category.facet_owners().get(value_id).copied();
    if owner != Some(facet_id) {
        tracing::debug!(
            category = %category.slug,
            facet_id,
            value_id,
            "Ignoring facet action for a value the facet does not own"
        );
        return None;
    }
    category.facet(facet_id)
}

/// Applies `action` to `state` and returns the resulting navigation for the
/// page of `category`.
///
/// Facet actions are checked against the category: a value its facet does
/// not own leaves the state unchanged, and toggles on a single-choice facet
/// behave like radio buttons.
pub fn apply(category: &Category, mut state: BrowseState, action: FilterAction) -> Navigation {
    let mode = match action {
        FilterAction::SetPage { .. } => NavigationMode::Push,
        _ => NavigationMode::Replace,
    };

    match action {
        FilterAction::ToggleBrand { brand_id } => state.toggle_brand(&brand_id),
        FilterAction::ToggleCondition { condition } => state.toggle_condition(condition),
        FilterAction::ToggleFacetValue { facet_id, value_id } => {
            match owning_facet(category, &facet_id, &value_id).map(|facet| facet.kind) {
                Some(FacetKind::Single) => state.toggle_facet_radio(&facet_id, &value_id),
                Some(FacetKind::Multi) => state.toggle_facet_value(&facet_id, &value_id),
                None => {}
            }
        }
        FilterAction::SetFacetRadio { facet_id, value_id } => {
            if owning_facet(category, &facet_id, &value_id).is_some() {
                state.set_facet_radio(&facet_id, &value_id);
            }
        }
        FilterAction::SetStock { stock } => state.set_stock(stock),
        FilterAction::SetPriceRange { min, max } => state.set_price_range(min, max),
        FilterAction::SetSort { sort } => state.set_sort(sort),
        FilterAction::SetPage { page } => state.set_page(page),
        FilterAction::ClearAll => {
            return Navigation {
                location: category_path(&category.slug),
                mode,
            };
        }
    }

    Navigation::to_state(category, &state, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{Facet, FacetKind, FacetValue};

    fn facet(id: &str, kind: FacetKind, values: &[&str]) -> Facet {
        Facet {
            id: id.into(),
            name: id.into(),
            kind,
            values: values
                .iter()
                .map(|v| FacetValue {
                    id: (*v).into(),
                    label: (*v).into(),
                })
                .collect(),
        }
    }

    fn shoes() -> Category {
        Category {
            id: "shoes".into(),
            slug: "shoes".into(),
            name: "Shoes".into(),
            facets: vec![
                facet("color", FacetKind::Multi, &["red", "blue", "black"]),
                facet("size", FacetKind::Single, &["s40", "s41", "s42"]),
            ],
        }
    }

    fn set<T: Ord + Clone>(values: &[T]) -> BTreeSet<T> {
        values.iter().cloned().collect()
    }

    fn pairs(query: &str) -> BTreeSet<(String, String)> {
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_decode_shoes_scenario() {
        let query = "?brand=nike&brand=adidas&cond=0&min=50&max=200&page=2";
        let state = decode(query, &shoes());

        assert_eq!(
            state.filters.brand_ids,
            set(&["nike".to_string(), "adidas".to_string()])
        );
        assert_eq!(state.filters.condition, set(&[Condition::New]));
        assert_eq!(state.filters.min_price, Some(50.0));
        assert_eq!(state.filters.max_price, Some(200.0));
        assert_eq!(state.filters.category_ids, set(&["shoes".to_string()]));
        assert_eq!(state.page, 2);
        assert_eq!(state.sort, SortOrder::Featured);

        let encoded = encode(&state);
        assert_eq!(pairs(&encoded), pairs(&query[1..]));
    }

    #[test]
    fn test_encode_default_state_is_empty() {
        let state = BrowseState::new(FilterState::for_category("shoes"));
        assert_eq!(encode(&state), "");
    }

    #[test]
    fn test_decode_of_empty_query_is_default() {
        let state = decode("", &shoes());
        assert_eq!(state, BrowseState::new(FilterState::for_category("shoes")));
    }

    #[test]
    fn test_round_trip_full_state() {
        let category = shoes();
        let mut state = BrowseState::new(FilterState::for_category("shoes"));
        state.filters.brand_ids = set(&["nike".to_string(), "new balance".to_string()]);
        state.filters.condition = set(&[Condition::Used, Condition::LikeNew]);
        state.filters.stock_status = Some(StockStatus::OutOfStock);
        state.filters.min_price = Some(19.99);
        state.filters.max_price = Some(120.5);
        state.filters.facet_filters = set(&[
            FacetFilter::new("color", "red"),
            FacetFilter::new("color", "blue"),
            FacetFilter::new("size", "s42"),
        ]);
        state.page = 4;
        state.sort = SortOrder::PriceHigh;

        assert_eq!(decode(&encode(&state), &category), state);
    }

    #[test]
    fn test_round_trip_varied_states() {
        let category = shoes();
        let base = || BrowseState::new(FilterState::for_category("shoes"));
        let mut states = vec![base()];

        for condition in [Condition::New, Condition::Used, Condition::LikeNew] {
            let mut state = base();
            state.filters.condition.insert(condition);
            states.push(state);
        }
        for stock in [StockStatus::InStock, StockStatus::OutOfStock] {
            let mut state = base();
            state.filters.stock_status = Some(stock);
            states.push(state);
        }
        for (min, max) in [
            (Some(0.1), None),
            (None, Some(-5.5)),
            (Some(-12.75), Some(3.333)),
            (Some(200.0), Some(50.0)),
        ] {
            let mut state = base();
            state.filters.min_price = min;
            state.filters.max_price = max;
            states.push(state);
        }
        for brand in ["a&b", "ü", "new balance", "50%=off", "?#+"] {
            let mut state = base();
            state.filters.brand_ids.insert(brand.to_string());
            states.push(state);
        }
        for sort in [
            SortOrder::Featured,
            SortOrder::Newest,
            SortOrder::PriceLow,
            SortOrder::PriceHigh,
            SortOrder::Rating,
        ] {
            let mut state = base();
            state.sort = sort;
            state.page = 7;
            states.push(state);
        }
        let mut facets = base();
        facets.filters.facet_filters =
            set(&[FacetFilter::new("color", "black"), FacetFilter::new("size", "s40")]);
        states.push(facets);

        for state in states {
            let query = encode(&state);
            let decoded = decode(&query, &category);
            assert_eq!(decoded, state, "query: {query}");
            assert_eq!(encode(&decoded), query);
        }
    }

    #[test]
    fn test_decode_keeps_one_value_of_single_choice_facet() {
        let state = decode("facet=s41&facet=s40&facet=red&facet=blue", &shoes());

        assert_eq!(
            state.filters.facet_filters,
            set(&[
                FacetFilter::new("color", "blue"),
                FacetFilter::new("color", "red"),
                FacetFilter::new("size", "s41"),
            ])
        );
    }

    #[test]
    fn test_toggle_on_single_choice_facet_is_exclusive() {
        let category = shoes();
        let state = decode("facet=s40", &category);

        let nav = apply(
            &category,
            state,
            FilterAction::ToggleFacetValue {
                facet_id: "size".into(),
                value_id: "s41".into(),
            },
        );
        assert_eq!(nav.location, "/categories/shoes?facet=s41");

        let state = decode("facet=s41", &category);
        let nav = apply(
            &category,
            state,
            FilterAction::ToggleFacetValue {
                facet_id: "size".into(),
                value_id: "s41".into(),
            },
        );
        assert_eq!(nav.location, "/categories/shoes");
    }

    #[test]
    fn test_facet_action_with_foreign_value_is_ignored() {
        let category = shoes();
        let state = decode("facet=red&facet=s40&page=3", &category);

        let radio = apply(
            &category,
            state.clone(),
            FilterAction::SetFacetRadio {
                facet_id: "color".into(),
                value_id: "s41".into(),
            },
        );
        assert_eq!(radio.location, "/categories/shoes?facet=red&facet=s40&page=3");

        let toggle = apply(
            &category,
            state,
            FilterAction::ToggleFacetValue {
                facet_id: "size".into(),
                value_id: "gold".into(),
            },
        );
        assert_eq!(toggle.location, "/categories/shoes?facet=red&facet=s40&page=3");
    }

    #[test]
    fn test_repeated_keys_not_comma_joined() {
        let mut state = BrowseState::new(FilterState::for_category("shoes"));
        state.toggle_brand("nike");
        state.toggle_brand("puma");

        let encoded = encode(&state);
        assert_eq!(encoded, "brand=nike&brand=puma");
    }

    #[test]
    fn test_decode_drops_stale_and_invalid_values() {
        let state = decode(
            "facet=red&facet=gold&cond=7&stock=9&min=abc&page=0&sort=cheapest&utm=x",
            &shoes(),
        );

        assert_eq!(
            state.filters.facet_filters,
            set(&[FacetFilter::new("color", "red")])
        );
        assert!(state.filters.condition.is_empty());
        assert_eq!(state.filters.stock_status, None);
        assert_eq!(state.filters.min_price, None);
        assert_eq!(state.page, 1);
        assert_eq!(state.sort, SortOrder::Featured);
    }

    #[test]
    fn test_radio_selection_is_exclusive_per_facet() {
        let mut state = BrowseState::new(FilterState::for_category("shoes"));
        state.toggle_facet_value("color", "red");

        state.set_facet_radio("size", "s40");
        state.set_facet_radio("size", "s41");

        assert_eq!(
            state.filters.facet_filters,
            set(&[FacetFilter::new("color", "red"), FacetFilter::new("size", "s41")])
        );
    }

    #[test]
    fn test_filter_actions_replace_and_reset_page() {
        let mut state = decode("page=3", &shoes());
        state.page = 3;

        let nav = apply(
            &shoes(),
            state,
            FilterAction::ToggleBrand {
                brand_id: "nike".into(),
            },
        );

        assert_eq!(nav.mode, NavigationMode::Replace);
        assert_eq!(nav.location, "/categories/shoes?brand=nike");
    }

    #[test]
    fn test_page_action_pushes() {
        let state = decode("brand=nike", &shoes());
        let nav = apply(&shoes(), state, FilterAction::SetPage { page: 2 });

        assert_eq!(nav.mode, NavigationMode::Push);
        assert_eq!(nav.location, "/categories/shoes?brand=nike&page=2");
    }

    #[test]
    fn test_clear_all_returns_bare_path() {
        let category = shoes();
        let state = decode("brand=nike&facet=red&sort=rating&page=5", &category);
        let nav = apply(&category, state, FilterAction::ClearAll);

        assert_eq!(nav.location, "/categories/shoes");
        assert_eq!(
            decode("", &category),
            BrowseState::new(FilterState::for_category("shoes"))
        );
    }

    #[test]
    fn test_toggle_twice_removes() {
        let mut state = BrowseState::new(FilterState::for_category("shoes"));
        state.toggle_condition(Condition::Used);
        state.toggle_condition(Condition::Used);
        assert!(state.filters.condition.is_empty());
    }

    #[test]
    fn test_filter_action_wire_format() {
        let action: FilterAction = serde_json::from_value(serde_json::json!({
            "action": "setFacetRadio",
            "facetId": "size",
            "valueId": "s42"
        }))
        .unwrap();

        assert_eq!(
            action,
            FilterAction::SetFacetRadio {
                facet_id: "size".into(),
                value_id: "s42".into()
            }
        );

        let clear: FilterAction =
            serde_json::from_value(serde_json::json!({ "action": "clearAll" })).unwrap();
        assert_eq!(clear, FilterAction::ClearAll);
    }
}
