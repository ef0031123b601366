//! GFF3-style prediction output.
//!
//! One feature line per query segment. Column 6 carries the support
//! count; the taxon range lives in the attribute column:
//!
//! ```text
//! ##gff-version 3
//! q1\ttaxpin\tsequence_feature\t10\t50\t41\t.\t.\ttax=5;rank=species;utax=1;ival=1.000;rtax=5;signal=1.0
//! ```

use anyhow::Result;
use std::fmt::Write as FmtWrite;
use std::io::Write;

use crate::common::PredictionRecord;
use crate::taxonomy::Taxonomy;

const SOURCE: &str = "taxpin";

pub fn write_predictions<W: Write>(
    writer: &mut W,
    predictions: &[PredictionRecord],
    taxonomy: &Taxonomy,
) -> Result<()> {
    writeln!(writer, "##gff-version 3")?;
    for prediction in predictions {
        writeln!(writer, "{}", feature_line(prediction, taxonomy))?;
    }
    Ok(())
}

fn feature_line(prediction: &PredictionRecord, taxonomy: &Taxonomy) -> String {
    let lower = taxonomy.node(prediction.lower_node);
    let upper = taxonomy.node(prediction.upper_node);

    let mut attributes = format!(
        "tax={};rank={};utax={};ival={:.3}",
        lower.tax_id, lower.rank, upper.tax_id, prediction.interpolation
    );
    if let Some(best) = prediction.best_reference {
        let _ = write!(attributes, ";rtax={}", taxonomy.node(best).tax_id);
    }
    let _ = write!(attributes, ";signal={:.1}", prediction.signal_strength);

    format!(
        "{}\t{}\tsequence_feature\t{}\t{}\t{}\t.\t.\t{}",
        prediction.query_id,
        SOURCE,
        prediction.feature_begin,
        prediction.feature_end,
        prediction.support,
        attributes
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_entries(vec![
            (1, 1, "root".to_string(), "no rank".to_string()),
            (5, 1, "Thermus".to_string(), "genus".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn formats_a_classified_prediction() {
        let tax = taxonomy();
        let prediction = PredictionRecord {
            query_id: "q1".to_string(),
            feature_begin: 10,
            feature_end: 50,
            interpolation: 0.25,
            lower_node: tax.find(5).unwrap(),
            upper_node: tax.root(),
            support: 41,
            best_reference: Some(tax.find(5).unwrap()),
            signal_strength: 0.0,
        };
        assert_eq!(
            feature_line(&prediction, &tax),
            "q1\ttaxpin\tsequence_feature\t10\t50\t41\t.\t.\ttax=5;rank=genus;utax=1;ival=0.250;rtax=5;signal=0.0"
        );
    }

    #[test]
    fn omits_rtax_for_unclassified_predictions() {
        let tax = taxonomy();
        let prediction = PredictionRecord {
            query_id: "q2".to_string(),
            feature_begin: 1,
            feature_end: 80,
            interpolation: 1.0,
            lower_node: tax.root(),
            upper_node: tax.root(),
            support: 0,
            best_reference: None,
            signal_strength: 0.0,
        };
        let line = feature_line(&prediction, &tax);
        assert!(!line.contains("rtax="));
        assert!(line.contains("tax=1;rank=no rank;utax=1;ival=1.000"));
    }

    #[test]
    fn writes_header_and_one_line_per_prediction() {
        let tax = taxonomy();
        let prediction = PredictionRecord {
            query_id: "q1".to_string(),
            feature_begin: 1,
            feature_end: 9,
            interpolation: 1.0,
            lower_node: tax.root(),
            upper_node: tax.root(),
            support: 3,
            best_reference: None,
            signal_strength: 1.0,
        };
        let mut out = Vec::new();
        write_predictions(&mut out, &[prediction.clone(), prediction], &tax).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("##gff-version 3\n"));
    }
}
