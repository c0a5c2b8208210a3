//! The three filter dialects must produce the same tree for the same intent

use geoquery_core::error::ErrorKind;
use geoquery_core::models::{
    ComparisonOperator, Crs, FieldCatalog, FieldDefinition, FieldType, FilterExpression, Literal,
    ParserLimits, SpatialPredicate,
};
use geoquery_filter::{parse_filter, FilterContext, FilterDialect};
use geoquery_geo::GeometryParser;

const FES_NS: &str =
    r#"xmlns:fes="http://www.opengis.net/fes/2.0" xmlns:gml="http://www.opengis.net/gml/3.2""#;

fn catalog() -> FieldCatalog {
    FieldCatalog::new(vec![
        FieldDefinition::new("id", FieldType::Integer),
        FieldDefinition::new("age", FieldType::Integer),
        FieldDefinition::new("status", FieldType::String),
        FieldDefinition::geometry("geom", Crs::wgs84()),
    ])
    .with_primary_key("id")
}

fn parse_all(inputs: &[&str]) -> Vec<geoquery_core::error::Result<Option<FilterExpression>>> {
    let catalog = catalog();
    inputs
        .iter()
        .map(|input| {
            let geometry = GeometryParser::default();
            let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());
            parse_filter(input, None, &ctx)
        })
        .collect()
}

fn fes(body: &str) -> String {
    format!("<fes:Filter {}>{}</fes:Filter>", FES_NS, body)
}

#[test]
fn test_between_is_the_same_node_everywhere() {
    let fes = fes(
        "<fes:PropertyIsBetween><fes:ValueReference>age</fes:ValueReference>\
         <fes:LowerBoundary><fes:Literal>18</fes:Literal></fes:LowerBoundary>\
         <fes:UpperBoundary><fes:Literal>65</fes:Literal></fes:UpperBoundary></fes:PropertyIsBetween>",
    );
    let results = parse_all(&[
        "age BETWEEN 18 AND 65",
        r#"{"op": "between", "args": [{"property": "age"}, 18, 65]}"#,
        &fes,
    ]);

    let expected = FilterExpression::Between {
        field: "age".into(),
        lower: Literal::Integer(18),
        upper: Literal::Integer(65),
    };
    for result in results {
        assert_eq!(result.unwrap(), Some(expected.clone()));
    }
}

#[test]
fn test_null_check_on_geometry_field_everywhere() {
    let fes = fes("<fes:PropertyIsNull><fes:ValueReference>geom</fes:ValueReference></fes:PropertyIsNull>");
    let results = parse_all(&[
        "geom IS NULL",
        r#"{"op": "isNull", "args": [{"property": "geom"}]}"#,
        &fes,
    ]);

    let expected = FilterExpression::IsNull { field: "geom".into(), negated: false };
    for result in results {
        assert_eq!(result.unwrap(), Some(expected.clone()));
    }
}

#[test]
fn test_single_value_in_collapses_to_equality() {
    let results = parse_all(&[
        "status IN ('open')",
        r#"{"op": "in", "args": [{"property": "status"}, ["open"]]}"#,
    ]);
    let expected =
        FilterExpression::comparison("status", ComparisonOperator::Equal, Literal::String("open".into()));
    for result in results {
        assert_eq!(result.unwrap(), Some(expected.clone()));
    }
}

#[test]
fn test_nesting_past_the_cap_fails_in_every_dialect() {
    let leaf_json = r#"{"op": "=", "args": [{"property": "age"}, 1]}"#;
    let json = (0..11).fold(leaf_json.to_string(), |inner, _| {
        format!(r#"{{"op": "not", "args": [{}]}}"#, inner)
    });
    let xml = fes(&format!(
        "{}<fes:PropertyIsEqualTo><fes:ValueReference>age</fes:ValueReference>\
         <fes:Literal>1</fes:Literal></fes:PropertyIsEqualTo>{}",
        "<fes:Not>".repeat(11),
        "</fes:Not>".repeat(11)
    ));
    let cql = format!("{}age = 1", "NOT ".repeat(11));

    for result in parse_all(&[&cql, &json, &xml]) {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("maximum depth of 10"), "{}", err);
    }
}

#[test]
fn test_intersects_equivalent_across_geometry_encodings() {
    let gml = fes(
        "<fes:Intersects><fes:ValueReference>geom</fes:ValueReference>\
         <gml:Polygon srsName=\"EPSG:4326\"><gml:exterior><gml:LinearRing>\
         <gml:posList>0 0 10 0 10 10 0 10 0 0</gml:posList>\
         </gml:LinearRing></gml:exterior></gml:Polygon></fes:Intersects>",
    );
    let results = parse_all(&[
        "S_INTERSECTS(geom, POLYGON((0 0, 10 0, 10 10, 0 10, 0 0)))",
        r#"{"op": "s_intersects", "args": [{"property": "geom"},
            {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}]}"#,
        &gml,
    ]);

    let trees: Vec<FilterExpression> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    let FilterExpression::Spatial(first) = &trees[0] else {
        panic!("expected spatial");
    };
    assert_eq!(first.predicate, SpatialPredicate::Intersects);
    assert_eq!(first.geometry.crs, Crs::wgs84());
    assert_eq!(trees[1], trees[0]);
    assert_eq!(trees[2], trees[0]);
}

#[test]
fn test_dwithin_one_mile_in_meters() {
    let xml = fes(
        "<fes:DWithin><fes:ValueReference>geom</fes:ValueReference>\
         <gml:Point srsName=\"EPSG:4326\"><gml:pos>5 5</gml:pos></gml:Point>\
         <fes:Distance uom=\"mile\">1</fes:Distance></fes:DWithin>",
    );
    let results = parse_all(&[
        "DWITHIN(geom, POINT(5 5), 1, mile)",
        r#"{"op": "s_dwithin", "args": [{"property": "geom"}, {"type": "Point", "coordinates": [5, 5]}, 1, "mile"]}"#,
        &xml,
    ]);
    for result in results {
        let Some(FilterExpression::Spatial(filter)) = result.unwrap() else {
            panic!("expected spatial");
        };
        let distance = filter.distance.unwrap();
        assert!((distance.value - 1609.344).abs() < 1e-9);
    }
}

#[test]
fn test_unknown_field_is_a_located_parse_error() {
    let results = parse_all(&[
        "height > 3",
        r#"{"op": ">", "args": [{"property": "height"}, 3]}"#,
    ]);
    let locators = ["byte 0", "$.args[0]"];
    for (result, locator) in results.into_iter().zip(locators) {
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains(locator), "{}", err);
        assert!(err.to_string().contains("height"), "{}", err);
    }
}

#[test]
fn test_external_entities_are_rejected() {
    let hostile = r#"<?xml version="1.0"?>
<!DOCTYPE Filter [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<Filter><PropertyIsEqualTo><ValueReference>status</ValueReference><Literal>&xxe;</Literal></PropertyIsEqualTo></Filter>"#;
    let err = parse_all(&[hostile]).remove(0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_explicit_filter_lang_overrides_detection() {
    let catalog = catalog();
    let geometry = GeometryParser::default();
    let ctx = FilterContext::new(&catalog, &geometry, ParserLimits::default());

    assert!(parse_filter("age = 1", Some("cql2-json"), &ctx).is_err());
    assert!(parse_filter("age = 1", Some("cql2-text"), &ctx).unwrap().is_some());
    assert_eq!("FES".parse::<FilterDialect>().unwrap(), FilterDialect::Fes);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    const OPERATORS: [&str; 6] = ["=", "<>", "<", "<=", ">", ">="];

    proptest! {
        #[test]
        fn prop_text_and_json_comparisons_agree(op in 0usize..6, value in 0i64..1_000_000, word in "[a-z]{1,12}") {
            let op = OPERATORS[op];
            let json_number = format!(r#"{{"op": "{}", "args": [{{"property": "age"}}, {}]}}"#, op, value);
            let json_string = format!(r#"{{"op": "=", "args": [{{"property": "status"}}, "{}"]}}"#, word);
            let results = parse_all(&[
                &format!("age {} {}", op, value),
                &json_number,
                &format!("status = '{}'", word),
                &json_string,
            ]);
            let mut results = results.into_iter().map(|r| r.unwrap());
            prop_assert_eq!(results.next(), results.next());
            prop_assert_eq!(results.next(), results.next());
        }
    }
}
