//! Type-level reference graphs and their Graphviz rendering.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// Which types were observed to reference which other types.
///
/// The vertices of the graph are display names of types.
/// There is at most one edge between two types,
/// no matter how many instances reference each other.
/// Edges are candidates found by a conservative scan;
/// see [`Resolver`][`crate::Resolver`] for what that implies.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyGraph
{
    /// Adjacency list from referencing type to referenced types.
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph
{
    #[allow(missing_docs)]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Add the edge `from -> to`.
    ///
    /// Returns whether the edge is new.
    pub fn add_edge(&mut self, from: &str, to: &str) -> bool
    {
        if let Some(targets) = self.edges.get_mut(from) {
            return targets.insert(to.to_owned());
        }
        self.edges.insert(from.to_owned(), BTreeSet::from([to.to_owned()]));
        true
    }

    /// Whether the edge `from -> to` exists.
    pub fn contains_edge(&self, from: &str, to: &str) -> bool
    {
        self.edges.get(from).map_or(false, |targets| targets.contains(to))
    }

    /// Every edge, ordered by source then target.
    pub fn edges(&self) -> impl Iterator<Item=(&str, &str)>
    {
        self.edges.iter().flat_map(|(from, targets)| {
            targets.iter().map(move |to| (from.as_str(), to.as_str()))
        })
    }

    /// Types referencing `to`.
    pub fn sources_of<'a>(&'a self, to: &'a str)
        -> impl Iterator<Item=&'a str> + 'a
    {
        self.edges.iter()
            .filter(move |(_, targets)| targets.contains(to))
            .map(|(from, _)| from.as_str())
    }

    #[allow(missing_docs)]
    pub fn edge_count(&self) -> usize
    {
        self.edges.values().map(BTreeSet::len).sum()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.edges.is_empty()
    }

    /// Whether `name` has outgoing edges but no other type references it.
    ///
    /// A type that only references itself still counts as root-like.
    /// This is a heuristic: the type is likely a top-level owner,
    /// such as a global or a long-lived singleton.
    /// Because it works per type rather than per instance,
    /// instances of one type with different owners are conflated.
    pub fn is_root_like(&self, name: &str) -> bool
    {
        self.edges.contains_key(name)
            && self.sources_of(name).all(|from| from == name)
    }

    /// Every root-like type; see [`is_root_like`][`Self::is_root_like`].
    pub fn root_like(&self) -> BTreeSet<&str>
    {
        self.edges.keys()
            .map(String::as_str)
            .filter(|name| self.is_root_like(name))
            .collect()
    }
}

/// Write the graph in the Graphviz DOT language.
///
/// Each edge becomes one statement on its own line.
/// Root-like types are drawn filled.
impl fmt::Display for DependencyGraph
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        const FONTNAME:   &str = "monospace";
        const COLOR_ROOT: &str = "/reds3/3";
        const PALETTE:    &str = "set28";
        const PALETTE_LEN: usize = 8;

        writeln!(f, "digraph {{")?;
        writeln!(f, "node [fontname = {FONTNAME}, shape = box];")?;

        for (i, (from, targets)) in self.edges.iter().enumerate() {
            let from_id = DotId(from);
            let color = i % PALETTE_LEN + 1;
            for to in targets {
                let to_id = DotId(to);
                writeln!(f,
                    "{from_id} -> {to_id} [color = \"/{PALETTE}/{color}\"];")?;
            }
            if self.is_root_like(from) {
                writeln!(f,
                    "{from_id} [style = filled, fillcolor = \"{COLOR_ROOT}\"];")?;
            }
        }

        writeln!(f, "}}")
    }
}

/// Quoted DOT identifier.
struct DotId<'a>(&'a str);

impl fmt::Display for DotId<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        use fmt::Write;
        f.write_char('"')?;
        for c in self.0.chars() {
            match c {
                '"'  => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                c    => f.write_char(c)?,
            }
        }
        f.write_char('"')
    }
}
