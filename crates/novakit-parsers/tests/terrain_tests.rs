//! Quadtree terrain tests

use novakit_core::FourCC;
use novakit_parsers::io::{BitReader, BitWriter};
use novakit_parsers::terrain::{DepthMap, QuadTree, TerrainHeader, TerrainVertex, TriangleStrip};
use novakit_parsers::{ErrorKind, ParseOptions, Parser, TerrainFile, TerrainParser};

/// 16x16 grid with three levels; every leaf gets a two-triangle strip
fn leafy_terrain() -> TerrainFile {
    let header = TerrainHeader::new(FourCC(*b"CPT1"), 16, 3);
    let heights: Vec<i16> = (0..256).map(|i| ((i * 131) % 2000) as i16 - 700).collect();
    let depth = DepthMap::from_heights(16, 16, heights).unwrap();

    let mut tree = QuadTree::full(&header);
    let leaf_ids: Vec<usize> = tree
        .depth_first()
        .into_iter()
        .filter(|&i| tree.node(i).is_some_and(|n| n.is_leaf()))
        .collect();
    for id in leaf_ids {
        let node = tree.node_mut(id).unwrap();
        node.vertices = vec![
            TerrainVertex { x: 0, y: 0, height: 0.0 },
            TerrainVertex { x: 3, y: 0, height: 0.0 },
            TerrainVertex { x: 0, y: 3, height: 0.0 },
            TerrainVertex { x: 3, y: 3, height: 0.0 },
        ];
        node.strips = vec![TriangleStrip {
            vertex_count: 4,
            flag: false,
            indices: vec![0, 1, 2, 3],
            runs: Vec::new(),
        }];
    }

    TerrainFile::build(header, depth, tree).unwrap()
}

mod structure_tests {
    use super::*;

    #[test]
    fn test_full_tree_shape() {
        let terrain = leafy_terrain();
        let tree = terrain.quadtree.as_ref().unwrap();

        assert_eq!(tree.len(), 21);
        assert_eq!(tree.leaves().count(), 16);
        assert_eq!(tree.nodes_at_level(1).count(), 4);
        assert_eq!(tree.root().unwrap().size, 16);
    }

    #[test]
    fn test_decoded_node_count_matches_level_formula() {
        let depth = DepthMap::from_heights(1, 1, vec![0]).unwrap();

        for levels in 1..=11i16 {
            let header = TerrainHeader::new(FourCC(*b"CPT1"), 1 << (levels - 1), levels);
            let expected = (4usize.pow(levels as u32) - 1) / 3;
            assert_eq!(header.total_node_count(), expected);
            assert_eq!(header.min_node_size(), 1);

            let mut writer = BitWriter::new();
            QuadTree::full(&header).write(&mut writer).unwrap();
            let bytes = writer.into_bytes();

            let tree = QuadTree::read(&mut BitReader::new(&bytes), &header, &depth).unwrap();
            assert_eq!(tree.len(), expected, "levels = {levels}");
            assert_eq!(tree.leaves().count(), 4usize.pow(levels as u32 - 1));
        }
    }

    #[test]
    fn test_height_lookup_wraps() {
        let terrain = leafy_terrain();
        let depth = terrain.depth_map.as_ref().unwrap();
        assert_eq!(depth.height_at(1024 + 3, 2), depth.height_at(3, 2));
        assert_eq!(depth.height_at(5, 2048 + 1), depth.height_at(5, 1));
    }
}

mod codec_tests {
    use super::*;

    #[test]
    fn test_round_trip_is_bit_exact() {
        let terrain = leafy_terrain();
        let parser = TerrainParser::new();
        let bytes = parser.serialize(&terrain).unwrap();

        let decoded = parser.decode(&bytes, &ParseOptions::strict()).unwrap();
        assert_eq!(decoded.value, terrain);
        assert_eq!(parser.serialize(&decoded.value).unwrap(), bytes);
    }

    #[test]
    fn test_vertex_heights_come_from_depth_map() {
        let terrain = leafy_terrain();
        let bytes = TerrainParser::new().serialize(&terrain).unwrap();
        let decoded = TerrainParser::new().parse(&bytes).unwrap();

        let depth = decoded.depth_map.as_ref().unwrap();
        let tree = decoded.quadtree.as_ref().unwrap();
        for node in tree.leaves() {
            for vertex in &node.vertices {
                let x = u32::from(node.sector_x) + u32::from(vertex.x);
                let y = u32::from(node.sector_y) + u32::from(vertex.y);
                assert_eq!(vertex.height, depth.height_world(x, y).unwrap());
            }
        }
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = TerrainParser::new().serialize(&leafy_terrain()).unwrap();
        let err = TerrainParser::new().parse(&bytes[..bytes.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
    }
}
