//! End-to-end build/open round trips over in-memory images

use cognigraph::{Graph, GraphBuilder, GraphError, PropertyValue, ValueKind};

#[test]
fn single_literal_node_round_trips() {
    let mut builder = GraphBuilder::new();
    let root = builder
        .write_symbol_node(
            1,
            100,
            0,
            11,
            &[],
            &[
                ("NodeType", PropertyValue::String("StringLiteral".to_string())),
                ("Value", PropertyValue::String("hello world".to_string())),
            ],
        )
        .unwrap();
    let image = builder.build(root, "hello world").unwrap();

    let graph = Graph::from_bytes(image).unwrap();
    let root = graph.root().unwrap();
    assert_eq!(root.symbol_id(), 1);
    assert_eq!(root.node_type(), 100);
    assert_eq!(root.source_start(), 0);
    assert_eq!(root.source_length(), 11);
    assert_eq!(
        root.property("NodeType").unwrap().as_str().unwrap(),
        "StringLiteral"
    );
    assert_eq!(
        root.property("Value").unwrap().as_str().unwrap(),
        "hello world"
    );
    assert!(!root.is_ambiguous().unwrap());

    let stats = graph.stats();
    assert!(stats.node_count >= 1);
    assert_eq!(stats.source_len, 11);
    assert_eq!(graph.source_text().unwrap(), "hello world");
}

#[test]
fn ambiguous_expression_keeps_both_derivations() {
    let mut builder = GraphBuilder::new();
    let first = builder.write_packed_node(1, &[], &[]).unwrap();
    let second = builder.write_packed_node(2, &[], &[]).unwrap();
    let root = builder
        .write_symbol_node(7, 1, 0, 5, &[first, second], &[])
        .unwrap();
    let image = builder.build(root, "a+b*c").unwrap();

    let graph = Graph::from_bytes(image).unwrap();
    let root = graph.root().unwrap();
    assert!(root.is_ambiguous().unwrap());

    let packed = root.packed_nodes().unwrap();
    assert_eq!(packed.len(), 2);
    assert_eq!(packed.get(0).unwrap().rule_id(), 1);
    assert_eq!(packed.get(1).unwrap().rule_id(), 2);
    assert_eq!(root.source_text().unwrap(), "a+b*c");
}

#[test]
fn typed_properties_read_back_exactly() {
    let mut builder = GraphBuilder::new();
    let root = builder
        .write_symbol_node(
            1,
            1,
            0,
            0,
            &[],
            &[
                ("StringProp", PropertyValue::String("test string".to_string())),
                ("IntProp", PropertyValue::I32(42)),
                ("BoolProp", PropertyValue::Bool(true)),
                ("DoubleProp", PropertyValue::F64(3.14159)),
            ],
        )
        .unwrap();
    let image = builder.build(root, "").unwrap();

    let graph = Graph::from_bytes(image).unwrap();
    let root = graph.root().unwrap();
    assert_eq!(
        root.property("StringProp").unwrap().as_str().unwrap(),
        "test string"
    );
    assert_eq!(root.property("IntProp").unwrap().as_i32().unwrap(), 42);
    assert!(root.property("BoolProp").unwrap().as_bool().unwrap());
    assert_eq!(
        root.property("DoubleProp").unwrap().as_f64().unwrap(),
        3.14159
    );

    // A typed-string read of an integer property is a kind mismatch...
    let int_prop = root.property("IntProp").unwrap();
    assert!(matches!(
        int_prop.as_str(),
        Err(GraphError::TypeMismatch {
            expected: ValueKind::String,
            found: ValueKind::I32,
        })
    ));
    // ...and the try_ form turns that into an absent result
    assert_eq!(int_prop.try_as_str(), None);
    assert_eq!(int_prop.try_as_i32(), Some(42));
}

#[test]
fn every_declared_value_kind_round_trips() {
    let properties: Vec<(&str, PropertyValue)> = vec![
        ("s", PropertyValue::String("σ text".to_string())),
        ("i32", PropertyValue::I32(i32::MIN)),
        ("u32", PropertyValue::U32(u32::MAX)),
        ("i64", PropertyValue::I64(-(1 << 40))),
        ("u64", PropertyValue::U64(u64::MAX)),
        ("f32", PropertyValue::F32(1.5)),
        ("f64", PropertyValue::F64(-2.25)),
        ("b", PropertyValue::Bool(false)),
        ("raw", PropertyValue::Bytes(vec![0, 1, 2, 0xFF])),
    ];
    let mut builder = GraphBuilder::new();
    let root = builder.write_symbol_node(1, 1, 0, 0, &[], &properties).unwrap();
    let graph = Graph::from_bytes(builder.build(root, "").unwrap()).unwrap();

    let root = graph.root().unwrap();
    assert_eq!(root.property("s").unwrap().as_str().unwrap(), "σ text");
    assert_eq!(root.property("i32").unwrap().as_i32().unwrap(), i32::MIN);
    assert_eq!(root.property("u32").unwrap().as_u32().unwrap(), u32::MAX);
    assert_eq!(root.property("i64").unwrap().as_i64().unwrap(), -(1 << 40));
    assert_eq!(root.property("u64").unwrap().as_u64().unwrap(), u64::MAX);
    assert_eq!(root.property("f32").unwrap().as_f32().unwrap(), 1.5);
    assert_eq!(root.property("f64").unwrap().as_f64().unwrap(), -2.25);
    assert!(!root.property("b").unwrap().as_bool().unwrap());
    assert_eq!(
        root.property("raw").unwrap().as_bytes().unwrap(),
        &[0, 1, 2, 0xFF]
    );

    // Owned copies carry the same data back out
    for property in root.properties().unwrap().iter() {
        let property = property.unwrap();
        let owned = property.value().unwrap().to_property_value().unwrap();
        let wanted = properties
            .iter()
            .find(|(k, _)| *k == property.key().unwrap())
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(&owned, wanted);
    }
}

#[test]
fn absent_and_empty_lists_are_indistinguishable() {
    let mut builder = GraphBuilder::new();
    // An explicit zero-length list, and a node whose list offsets are 0
    let empty_list = builder.write_offset_list(&[]).unwrap();
    let root = builder.write_symbol_node(1, 1, 0, 0, &[], &[]).unwrap();
    let mut image = builder.build(root, "").unwrap();

    let absent = Graph::from_bytes(image.clone()).unwrap();
    assert_eq!(absent.root().unwrap().packed_nodes().unwrap().len(), 0);
    assert!(!absent.root().unwrap().is_ambiguous().unwrap());

    // Point the node's packed list at the present-but-empty list
    let field = root as usize + 12;
    image[field..field + 4].copy_from_slice(&empty_list.to_le_bytes());
    let present = Graph::from_bytes(image).unwrap();
    assert_eq!(present.root().unwrap().packed_nodes().unwrap().len(), 0);
    assert!(!present.root().unwrap().is_ambiguous().unwrap());
}

#[test]
fn ambiguity_needs_at_least_two_derivations() {
    for derivations in 0..3u32 {
        let mut builder = GraphBuilder::new();
        let packed: Vec<u32> = (0..derivations)
            .map(|i| builder.write_packed_node(i as u16, &[], &[]).unwrap())
            .collect();
        let root = builder.write_symbol_node(1, 1, 0, 0, &packed, &[]).unwrap();
        let graph = Graph::from_bytes(builder.build(root, "").unwrap()).unwrap();
        assert_eq!(
            graph.root().unwrap().is_ambiguous().unwrap(),
            derivations >= 2
        );
    }
}

#[test]
fn collections_iterate_in_emission_order() {
    let mut builder = GraphBuilder::new();
    let keys = ["zeta", "alpha", "midway"];
    let properties: Vec<(&str, PropertyValue)> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| (*k, PropertyValue::U32(i as u32)))
        .collect();
    let root = builder.write_symbol_node(1, 1, 0, 0, &[], &properties).unwrap();
    let graph = Graph::from_bytes(builder.build(root, "").unwrap()).unwrap();

    let read_keys: Vec<String> = graph
        .root()
        .unwrap()
        .properties()
        .unwrap()
        .iter()
        .map(|p| p.unwrap().key().unwrap().to_string())
        .collect();
    assert_eq!(read_keys, keys);
}

#[test]
fn deep_forest_walks_back_out() {
    // root -> packed(rule 3) -> [ident, expr]; expr -> packed(rule 4) -> [lit]
    let mut builder = GraphBuilder::new();
    let lit = builder
        .write_symbol_node(30, 3, 4, 1, &[], &[("v", PropertyValue::I32(2))])
        .unwrap();
    let inner = builder.write_packed_node(4, &[lit], &[]).unwrap();
    let expr = builder.write_symbol_node(20, 2, 4, 1, &[inner], &[]).unwrap();
    let ident = builder.write_symbol_node(10, 1, 0, 1, &[], &[]).unwrap();
    let outer = builder.write_packed_node(3, &[ident, expr], &[]).unwrap();
    let root = builder.write_symbol_node(1, 0, 0, 5, &[outer], &[]).unwrap();
    let graph = Graph::from_bytes(builder.build(root, "x = 2").unwrap()).unwrap();

    assert_eq!(graph.stats().node_count, 4);
    let root = graph.root().unwrap();
    let derivation = root.packed_nodes().unwrap().get(0).unwrap();
    assert_eq!(derivation.rule_id(), 3);

    let children = derivation.children().unwrap();
    assert_eq!(children.get(0).unwrap().source_text().unwrap(), "x");
    let expr = children.get(1).unwrap();
    assert_eq!(expr.source_text().unwrap(), "2");

    let lit = expr
        .packed_nodes()
        .unwrap()
        .get(0)
        .unwrap()
        .children()
        .unwrap()
        .get(0)
        .unwrap();
    assert_eq!(lit.property("v").unwrap().as_i32().unwrap(), 2);

    // Every built image satisfies the deep validation pass
    graph.validate().unwrap();
}

#[test]
fn query_shim_matches_the_root() {
    let mut builder = GraphBuilder::new();
    let root = builder.write_symbol_node(21, 300, 0, 0, &[], &[]).unwrap();
    let graph = Graph::from_bytes(builder.build(root, "").unwrap()).unwrap();

    assert_eq!(
        cognigraph::execute_query(&graph, "symbolId: 21").unwrap(),
        vec![root]
    );
    assert!(cognigraph::execute_query(&graph, "nodeType: 12")
        .unwrap()
        .is_empty());
    assert_eq!(
        cognigraph::execute_query(&graph, "everything").unwrap(),
        vec![root]
    );
}
