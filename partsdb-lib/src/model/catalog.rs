use super::{AttributePair, Category, CategoryId, Component};
use crate::{HashMap, Result};
use ohno::bail;

/// An immutable, fully resolved view of the catalogue, ready for querying.
///
/// Construction verifies that every attribute index and category id referenced by a
/// component resolves, so consumers can index without further checks.
#[derive(Debug, Default)]
pub struct Catalog {
    attributes: Vec<AttributePair>,
    categories: Vec<Category>,
    category_positions: HashMap<CategoryId, usize>,
    components: Vec<Component>,
    search_text: Vec<String>,
}

impl Catalog {
    pub fn new(attributes: Vec<AttributePair>, categories: Vec<Category>, components: Vec<Component>) -> Result<Self> {
        let mut category_positions = HashMap::default();
        for (pos, category) in categories.iter().enumerate() {
            if category_positions.insert(category.id, pos).is_some() {
                bail!("duplicate category id {}", category.id);
            }
        }

        for component in &components {
            if let Some(&bad) = component.attributes.iter().find(|&&idx| idx as usize >= attributes.len()) {
                bail!(
                    "component '{}' references attribute {bad}, but the lookup table only has {} entries",
                    component.lcsc,
                    attributes.len()
                );
            }

            if !category_positions.contains_key(&component.category_id) {
                bail!("component '{}' references unknown category {}", component.lcsc, component.category_id);
            }
        }

        let search_text = components.iter().map(search_projection).collect();

        Ok(Self {
            attributes,
            categories,
            category_positions,
            components,
            search_text,
        })
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributePair] {
        &self.attributes
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.category_positions.get(&id).map(|&pos| &self.categories[pos])
    }

    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[must_use]
    pub fn component(&self, lcsc: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.lcsc == lcsc)
    }

    /// Lowercased `lcsc manufacturer description` projection of the component at `index`.
    #[must_use]
    pub fn search_text(&self, index: usize) -> &str {
        &self.search_text[index]
    }

    /// Resolved attribute pairs of a component from this catalog.
    pub fn component_attributes<'a>(&'a self, component: &'a Component) -> impl Iterator<Item = &'a AttributePair> + 'a {
        component.attributes.iter().map(|&idx| &self.attributes[idx as usize])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

fn search_projection(component: &Component) -> String {
    format!("{} {} {}", component.lcsc, component.manufacturer, component.description).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn category(id: CategoryId) -> Category {
        Category {
            id,
            category: "Resistors".into(),
            subcategory: "Chip Resistor".into(),
            source_name: "resistors".into(),
            data_hash: "d".into(),
            stock_hash: "s".into(),
        }
    }

    fn component(lcsc: &str, attributes: Vec<u32>, category_id: CategoryId) -> Component {
        Component {
            lcsc: lcsc.into(),
            manufacturer: "UNI-ROYAL".into(),
            description: "10kΩ 0402 Resistor".into(),
            attributes,
            stock: Some(5),
            category_id,
            joints: Some(2),
            datasheet: String::new(),
            price: Vec::new(),
            image: None,
            url: String::new(),
        }
    }

    #[test]
    fn test_new_resolves_attributes() {
        let attrs = vec![AttributePair::new("Package", json!("0402")), AttributePair::new("Tolerance", json!("1%"))];
        let catalog = Catalog::new(attrs, vec![category(1)], vec![component("C25744", vec![1, 0], 1)]).unwrap();

        let c = &catalog.components()[0];
        let names: Vec<_> = catalog.component_attributes(c).map(AttributePair::name).collect();
        assert_eq!(names, ["Tolerance", "Package"]);
        assert_eq!(catalog.search_text(0), "c25744 uni-royal 10kω 0402 resistor");
        assert_eq!(catalog.category(1).unwrap().source_name, "resistors");
    }

    #[test]
    fn test_new_rejects_out_of_range_attribute() {
        let attrs = vec![AttributePair::new("Package", json!("0402"))];
        let err = Catalog::new(attrs, vec![category(1)], vec![component("C1", vec![1], 1)]).unwrap_err();
        assert!(err.to_string().contains("references attribute 1"));
    }

    #[test]
    fn test_new_rejects_unknown_category() {
        let result = Catalog::new(Vec::new(), vec![category(1)], vec![component("C1", Vec::new(), 7)]);
        let _ = result.unwrap_err();
    }

    #[test]
    fn test_new_rejects_duplicate_category_ids() {
        let result = Catalog::new(Vec::new(), vec![category(1), category(1)], Vec::new());
        let _ = result.unwrap_err();
    }
}
