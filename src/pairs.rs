//! Ordered attribute value lists.

use crate::{
    dictionary::{AttrId, Dictionary},
    value::Value,
};

/// An attribute together with its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pair {
    pub attr: AttrId,
    pub value: Value,
}

impl Pair {
    pub fn new(attr: AttrId, value: Value) -> Self {
        Pair { attr, value }
    }
}

/// Attribute value pairs in insertion order.
///
/// Order is significant: index pairs precede the leaf they qualify, and replies are read
/// front to back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairList(Vec<Pair>);

impl PairList {
    pub fn new() -> Self {
        PairList(Vec::new())
    }

    pub fn push(&mut self, pair: Pair) {
        self.0.push(pair);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Pair> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First pair for `attr`.
    pub fn find(&self, attr: AttrId) -> Option<&Pair> {
        self.0.iter().find(|pair| pair.attr == attr)
    }

    /// Multi-line listing used in debug logs.
    pub fn describe(&self, dict: &Dictionary) -> String {
        self.0
            .iter()
            .map(|pair| {
                let attr = dict.attr(pair.attr);
                format!("\t{} = {}", attr.name(), pair.value.render(attr))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<Pair>> for PairList {
    fn from(pairs: Vec<Pair>) -> Self {
        PairList(pairs)
    }
}

impl<'a> IntoIterator for &'a PairList {
    type Item = &'a Pair;
    type IntoIter = std::slice::Iter<'a, Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for PairList {
    type Item = Pair;
    type IntoIter = std::vec::IntoIter<Pair>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DataType;

    #[test]
    fn test_order_and_find() {
        let mut dict = Dictionary::new();
        let root = dict.root();
        let a = dict.add_attr(root, 1, "A", DataType::Integer).unwrap();
        let b = dict.add_attr(root, 2, "B", DataType::String).unwrap();

        let mut list = PairList::new();
        assert!(list.is_empty());
        list.push(Pair::new(b, Value::String(b"x".to_vec())));
        list.push(Pair::new(a, Value::Integer(1)));
        list.push(Pair::new(a, Value::Integer(2)));

        assert_eq!(list.len(), 3);
        let order: Vec<AttrId> = list.iter().map(|p| p.attr).collect();
        assert_eq!(order, vec![b, a, a]);
        assert_eq!(list.find(a).map(|p| &p.value), Some(&Value::Integer(1)));
        assert_eq!(list.describe(&dict), "\tB = x\n\tA = 1\n\tA = 2");
    }
}
