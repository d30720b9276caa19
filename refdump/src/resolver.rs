//! Finding out which tracked allocations reference a given allocation.
//!
//! # Conservative scanning
//!
//! The resolver knows nothing about the layout of the tracked types.
//! Instead it treats every tracked allocation as an array of words,
//! and considers any word equal to an allocation's address
//! to be a reference to that allocation.
//! Integers that happen to look like addresses,
//! stale data, and padding therefore produce spurious edges;
//! the edges in the resulting graph are candidates, not proofs.
//! In exchange, no type information beyond the size is needed.
//!
//! # Walking upward
//!
//! Starting from the target, the resolver scans all tracked allocations
//! for references to it. Each allocation found is a parent of the target,
//! and is itself scanned for in the same way, and so on.
//! Each allocation is scanned at most once per resolution,
//! which makes the walk terminate on reference cycles.

use {
    crate::{
        AllocationRecord,
        DependencyGraph,
        Memory,
        Naming,
        Options,
        RootRegion,
        RootRegions,
        memory::WORD,
        naming::leads_with_code,
    },
    std::{
        cell::OnceCell,
        collections::{BTreeSet, HashMap, HashSet},
    },
    tracing::{debug, trace},
};

/// Outcome of resolving the references to one allocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Resolution
{
    /// Display name of the target, if it is tracked.
    pub target: Option<String>,

    /// References found between types.
    pub graph: DependencyGraph,

    /// Types of scanned allocations that no tracked allocation references.
    ///
    /// These are held by static memory, the stack,
    /// or memory that is not tracked.
    pub terminals: BTreeSet<String>,

    /// Number of allocations scanned for.
    pub visited: usize,
}

/// Live allocation as seen during one resolution.
struct Node
{
    record: AllocationRecord,
    extent: usize,

    /// Display name, computed on first use.
    name: OnceCell<String>,
}

/// Index over a snapshot of the allocation table.
///
/// A resolver is built for one dump and discarded afterwards.
pub struct Resolver<'a>
{
    options: &'a Options,
    memory:  &'a dyn Memory,
    naming:  &'a dyn Naming,

    /// Static memory to scan; empty if disabled by the options.
    roots: Vec<RootRegion>,

    /// Live allocations, in table order.
    nodes: Vec<Node>,

    /// Maps base addresses to indices into nodes.
    index: HashMap<usize, usize>,
}

impl<'a> Resolver<'a>
{
    /// Index the live records of a snapshot.
    ///
    /// If multiple live records share a base address,
    /// which happens only when frees are not traced,
    /// the record that comes last in the snapshot is used.
    pub fn new(
        snapshot: &[AllocationRecord],
        options:  &'a Options,
        memory:   &'a dyn Memory,
        naming:   &'a dyn Naming,
        roots:    &dyn RootRegions,
    ) -> Self
    {
        let mut nodes: Vec<Node> = Vec::new();
        let mut index = HashMap::new();
        for record in snapshot.iter().filter(|r| r.is_live()) {
            let node = Node{
                record: *record,
                extent: record.extent(),
                name: OnceCell::new(),
            };
            match index.get(&record.base) {
                Some(&i) => nodes[i] = node,
                None => {
                    index.insert(record.base, nodes.len());
                    nodes.push(node);
                },
            }
        }

        let roots = if options.scan_global_regions {
            roots.regions()
        } else {
            Vec::new()
        };

        Self{options, memory, naming, roots, nodes, index}
    }

    /// Number of live allocations indexed.
    pub fn len(&self) -> usize
    {
        self.nodes.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool
    {
        self.nodes.is_empty()
    }

    /// Find the chains of references that lead to `target`.
    ///
    /// If `target` is not the base address of a live tracked allocation,
    /// the resolution is empty.
    pub fn resolve(&self, target: usize) -> Resolution
    {
        let Some(&start) = self.index.get(&target) else {
            debug!("Target {target:#x} is not tracked");
            return Resolution::default();
        };

        let max_depth = self.options.max_depth;
        let mut resolution = Resolution{
            target: Some(self.display_name(start).to_owned()),
            ..Resolution::default()
        };
        let mut visited = HashSet::new();
        let mut worklist = vec![(start, 0usize)];

        while let Some((id, depth)) = worklist.pop() {
            if max_depth > 0 && depth > max_depth {
                continue;
            }
            if !visited.insert(id) {
                continue;
            }

            let parents = self.scan(id, &mut resolution.graph);
            trace!(
                node = self.display_name(id),
                depth,
                parents = parents.len(),
                "Scanned node"
            );

            if parents.is_empty() {
                resolution.terminals.insert(self.display_name(id).to_owned());
            }

            // Reversed so that parents are visited in discovery order.
            worklist.extend(
                parents.into_iter().rev()
                .filter(|p| !visited.contains(p))
                .map(|p| (p, depth + 1))
            );
        }

        resolution.visited = visited.len();
        debug!(
            visited = resolution.visited,
            edges = resolution.graph.edge_count(),
            "Resolved references"
        );
        resolution
    }

    /// Find the nodes and static regions that reference node `id`,
    /// add the corresponding edges, and return the referencing nodes.
    fn scan(&self, id: usize, graph: &mut DependencyGraph) -> Vec<usize>
    {
        let address = self.nodes[id].record.base;
        let name = self.display_name(id);

        let parents: Vec<usize> = self.nodes.iter().enumerate()
            .filter(|(_, p)| {
                self.memory.contains_word(p.record.base, p.extent, address)
            })
            .map(|(i, _)| i)
            .collect();

        for &parent in &parents {
            graph.add_edge(self.display_name(parent), name);
        }

        for region in &self.roots {
            if self.memory.contains_word(region.start, region.len(), address) {
                graph.add_edge(region.section.pseudo_type(), name);
            }
        }

        parents
    }

    /// Display name of node `id`.
    ///
    /// Array allocations are shown as `[T]`.
    /// When enabled, the code address at the start of a function-like value
    /// is resolved and appended as `(file:line)` on a second line.
    fn display_name(&self, id: usize) -> &str
    {
        let node = &self.nodes[id];
        node.name.get_or_init(|| {
            let record = &node.record;
            let mut name = self.naming.type_name(&record.descriptor);
            if record.is_array {
                name = format!("[{name}]");
            }
            if self.options.resolve_closure_source_locations
                && node.extent >= WORD
                && leads_with_code(&record.descriptor)
            {
                let code = self.memory.read_word(record.base);
                if let Some(location) = self.naming.source_location(code) {
                    name = format!("{name}\n({location})");
                }
            }
            name
        })
    }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::{NoRoots, Section, SourceLocation, TypeDescriptor, TypeKind},
        std::{cell::Cell, collections::HashMap},
    };

    /// Memory made of explicitly written words; everything else is zero.
    #[derive(Default)]
    struct WordMemory
    {
        words: HashMap<usize, usize>,
    }

    impl WordMemory
    {
        fn write(&mut self, address: usize, value: usize)
        {
            self.words.insert(address, value);
        }
    }

    impl Memory for WordMemory
    {
        fn read_word(&self, address: usize) -> usize
        {
            self.words.get(&address).copied().unwrap_or(0)
        }
    }

    /// Names types verbatim, and code addresses as `code.rs:<address>`.
    #[derive(Default)]
    struct TestNaming
    {
        lookups: Cell<usize>,
    }

    impl Naming for TestNaming
    {
        fn type_name(&self, descriptor: &TypeDescriptor) -> String
        {
            descriptor.name().to_owned()
        }

        fn source_location(&self, code: usize) -> Option<SourceLocation>
        {
            self.lookups.set(self.lookups.get() + 1);
            let line = u32::try_from(code).ok()?;
            Some(SourceLocation{file: "code.rs".into(), line})
        }
    }

    fn ty(name: &'static str, size: usize) -> TypeDescriptor
    {
        TypeDescriptor::new(name, size, TypeKind::Aggregate)
    }

    fn object(name: &'static str, base: usize) -> AllocationRecord
    {
        AllocationRecord{descriptor: ty(name, 4 * WORD), base, is_array: false, count: 1}
    }

    fn resolve_with(
        options: &Options,
        records: &[AllocationRecord],
        memory:  &WordMemory,
        roots:   &dyn RootRegions,
        target:  usize,
    ) -> Resolution
    {
        let naming = TestNaming::default();
        Resolver::new(records, options, memory, &naming, roots).resolve(target)
    }

    fn resolve(records: &[AllocationRecord], memory: &WordMemory, target: usize)
        -> Resolution
    {
        resolve_with(&Options::default(), records, memory, &NoRoots, target)
    }

    #[test]
    fn direct_edge()
    {
        let records = [object("A", 0x1000), object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000 + 2 * WORD, 0x2000);

        let resolution = resolve(&records, &memory, 0x2000);
        assert_eq!(resolution.target.as_deref(), Some("B"));
        assert_eq!(resolution.graph.edges().collect::<Vec<_>>(), [("A", "B")]);
        assert_eq!(resolution.terminals, BTreeSet::from(["A".to_owned()]));
        assert_eq!(resolution.visited, 2);
    }

    #[test]
    fn no_reference_gives_no_edges()
    {
        let records = [object("A", 0x1000), object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x2001);
        memory.write(0x3000, 0x2000);

        let resolution = resolve(&records, &memory, 0x2000);
        assert!(resolution.graph.is_empty());
        assert_eq!(resolution.terminals, BTreeSet::from(["B".to_owned()]));
    }

    #[test]
    fn untracked_target_is_empty()
    {
        let records = [object("A", 0x1000)];
        let memory = WordMemory::default();
        assert_eq!(resolve(&records, &memory, 0x9000), Resolution::default());
        assert_eq!(resolve(&records, &memory, 0), Resolution::default());
    }

    #[test]
    fn freed_record_is_never_a_parent()
    {
        let mut records = [object("Stale", 0x1000), object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x2000);
        records[0].base = crate::FREED;

        let resolution = resolve(&records, &memory, 0x2000);
        assert!(resolution.graph.is_empty());
        assert_eq!(resolve(&records, &memory, 0x1000), Resolution::default());
    }

    #[test]
    fn cycle_terminates()
    {
        let records = [object("A", 0x1000), object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x2000);
        memory.write(0x2000 + WORD, 0x1000);

        let resolution = resolve(&records, &memory, 0x1000);
        assert!(resolution.graph.contains_edge("A", "B"));
        assert!(resolution.graph.contains_edge("B", "A"));
        assert_eq!(resolution.graph.edge_count(), 2);
        assert_eq!(resolution.visited, 2);
        assert!(resolution.terminals.is_empty());
    }

    #[test]
    fn self_reference()
    {
        let records = [object("Node", 0x1000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x1000);

        let resolution = resolve(&records, &memory, 0x1000);
        assert_eq!(resolution.graph.edges().collect::<Vec<_>>(), [("Node", "Node")]);
        assert_eq!(resolution.visited, 1);
    }

    #[test]
    fn chain_and_diamond()
    {
        // Root -> Left -> Leaf, Root -> Right -> Leaf.
        let records = [
            object("Leaf", 0x1000),
            object("Left", 0x2000),
            object("Right", 0x3000),
            object("Root", 0x4000),
        ];
        let mut memory = WordMemory::default();
        memory.write(0x2000, 0x1000);
        memory.write(0x3000, 0x1000);
        memory.write(0x4000, 0x2000);
        memory.write(0x4000 + WORD, 0x3000);

        let resolution = resolve(&records, &memory, 0x1000);
        let edges: Vec<_> = resolution.graph.edges().collect();
        assert_eq!(edges, [
            ("Left", "Leaf"),
            ("Right", "Leaf"),
            ("Root", "Left"),
            ("Root", "Right"),
        ]);
        assert_eq!(resolution.visited, 4);
        assert_eq!(resolution.graph.root_like(), BTreeSet::from(["Root"]));
    }

    #[test]
    fn max_depth_limits_walk()
    {
        // D -> C -> B -> A.
        let records = [
            object("A", 0x1000),
            object("B", 0x2000),
            object("C", 0x3000),
            object("D", 0x4000),
        ];
        let mut memory = WordMemory::default();
        memory.write(0x2000, 0x1000);
        memory.write(0x3000, 0x2000);
        memory.write(0x4000, 0x3000);

        let options = Options{max_depth: 1, ..Options::default()};
        let resolution = resolve_with(&options, &records, &memory, &NoRoots, 0x1000);
        let edges: Vec<_> = resolution.graph.edges().collect();
        assert_eq!(edges, [("B", "A"), ("C", "B")]);
        assert_eq!(resolution.visited, 2);

        let resolution = resolve(&records, &memory, 0x1000);
        assert_eq!(resolution.graph.edge_count(), 3);
    }

    #[test]
    fn only_whole_words_within_extent_are_scanned()
    {
        let small = AllocationRecord{
            descriptor: ty("Small", WORD + 4),
            base: 0x1000,
            is_array: false,
            count: 1,
        };
        let records = [small, object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000 + WORD, 0x2000);

        assert!(resolve(&records, &memory, 0x2000).graph.is_empty());
    }

    #[test]
    fn arrays_scan_every_element()
    {
        let array = AllocationRecord{
            descriptor: ty("Slot", 2 * WORD),
            base: 0x1000,
            is_array: true,
            count: 8,
        };
        let records = [array, object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000 + 15 * WORD, 0x2000);

        let resolution = resolve(&records, &memory, 0x2000);
        assert_eq!(resolution.graph.edges().collect::<Vec<_>>(), [("[Slot]", "B")]);
    }

    #[test]
    fn later_duplicate_record_wins()
    {
        let records = [object("Old", 0x1000), object("B", 0x2000), object("New", 0x1000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x2000);

        let resolution = resolve(&records, &memory, 0x2000);
        assert_eq!(resolution.graph.edges().collect::<Vec<_>>(), [("New", "B")]);
    }

    #[test]
    fn global_regions_are_attributed()
    {
        let records = [object("A", 0x1000), object("B", 0x2000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 0x2000);
        memory.write(0x8010, 0x1000);
        memory.write(0x9000, 0x2000);
        let roots = vec![
            RootRegion{start: 0x8000, end: 0x8100, section: Section::Data},
            RootRegion{start: 0x9000, end: 0x9100, section: Section::Bss},
        ];

        let options = Options{scan_global_regions: true, ..Options::default()};
        let resolution = resolve_with(&options, &records, &memory, &roots, 0x2000);
        let edges: Vec<_> = resolution.graph.edges().collect();
        assert_eq!(edges, [
            ("#GlobalBss", "B"),
            ("#GlobalData", "A"),
            ("A", "B"),
        ]);

        // Disabled scanning ignores the regions.
        let resolution = resolve_with(&Options::default(), &records, &memory, &roots, 0x2000);
        assert_eq!(resolution.graph.edges().collect::<Vec<_>>(), [("A", "B")]);
    }

    #[test]
    fn code_locations_are_appended_once()
    {
        let callback = AllocationRecord{
            descriptor: ty("Callback", 2 * WORD).with_code_pointer(),
            base: 0x1000,
            is_array: false,
            count: 1,
        };
        let records = [callback, object("B", 0x2000), object("C", 0x3000)];
        let mut memory = WordMemory::default();
        memory.write(0x1000, 42);
        memory.write(0x1000 + WORD, 0x2000);
        memory.write(0x3000, 0x1000);

        let options = Options{
            resolve_closure_source_locations: true,
            ..Options::default()
        };
        let naming = TestNaming::default();
        let resolver = Resolver::new(&records, &options, &memory, &naming, &NoRoots);
        let resolution = resolver.resolve(0x2000);
        let edges: Vec<_> = resolution.graph.edges().collect();
        assert_eq!(edges, [
            ("C", "Callback\n(code.rs:42)"),
            ("Callback\n(code.rs:42)", "B"),
        ]);
        assert_eq!(naming.lookups.get(), 1);

        // Without the option, the plain name is used.
        let resolution = resolve(&records, &memory, 0x2000);
        assert!(resolution.graph.contains_edge("Callback", "B"));
    }
}
