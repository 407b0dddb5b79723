use crate::attribute::{self, AttrValue, Scalar};
use crate::directory::Entry;


/// A projected search result: the DN first, then the attributes in the order
/// the directory returned them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub dn: String,
    pub attributes: Vec<(String, AttrValue)>,
}
impl Record {
    pub fn from_entry(entry: Entry) -> Self {
        let attributes = entry.attributes
            .into_iter()
            .map(|attr| (attr.name.clone(), attribute::decode(attr)))
            .collect();
        Self {
            dn: entry.dn,
            attributes,
        }
    }

    /// Looks up a field by name, ignoring case; `dn` is a field too.
    pub fn get(&self, name: &str) -> Option<AttrValue> {
        if name.eq_ignore_ascii_case("dn") {
            return Some(AttrValue::Single(Scalar::Text(self.dn.clone())));
        }
        self.attributes.iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// All fields in order, starting with `dn`.
    pub fn fields(&self) -> impl Iterator<Item = (&str, AttrValue)> + '_ {
        std::iter::once(("dn", AttrValue::Single(Scalar::Text(self.dn.clone()))))
            .chain(self.attributes.iter().map(|(n, v)| (n.as_str(), v.clone())))
    }
}
impl From<Entry> for Record {
    fn from(value: Entry) -> Self { Self::from_entry(value) }
}
