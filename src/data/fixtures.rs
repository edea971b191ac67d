//! XML builders for tests.

use crate::data::document::PUBLICATION_NAMESPACE;

pub struct SeriesXml {
    pub mrid: String,
    pub start: String,
    pub end: String,
    pub resolution: String,
    pub classification: Option<u32>,
    pub points: Vec<(u32, f64)>,
}

impl SeriesXml {
    /// Hourly series for a CET winter day; `start` like `2024-01-14T23:00Z`.
    pub fn hourly(mrid: &str, start: &str, end: &str) -> Self {
        Self {
            mrid: mrid.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            resolution: "PT60M".to_string(),
            classification: None,
            points: (1..=24).map(|p| (p, p as f64 * 10.0)).collect(),
        }
    }

    pub fn resolution(mut self, resolution: &str) -> Self {
        self.resolution = resolution.to_string();
        self
    }

    pub fn classification(mut self, seq: u32) -> Self {
        self.classification = Some(seq);
        self
    }

    pub fn points(mut self, points: &[(u32, f64)]) -> Self {
        self.points = points.to_vec();
        self
    }

    pub fn render(&self) -> String {
        let classification = self
            .classification
            .map(|seq| {
                format!(
                    "\n    <classificationSequence_AttributeInstanceComponent.position>{}</classificationSequence_AttributeInstanceComponent.position>",
                    seq
                )
            })
            .unwrap_or_default();

        let points: String = self
            .points
            .iter()
            .map(|(position, price)| {
                format!(
                    "\n      <Point>\n        <position>{}</position>\n        <price.amount>{}</price.amount>\n      </Point>",
                    position, price
                )
            })
            .collect();

        format!(
            "<TimeSeries>
    <mRID>{mrid}</mRID>
    <auction.type>A01</auction.type>
    <businessType>A62</businessType>{classification}
    <currency_Unit.name>EUR</currency_Unit.name>
    <price_Measure_Unit.name>MWH</price_Measure_Unit.name>
    <curveType>A03</curveType>
    <Period>
      <timeInterval>
        <start>{start}</start>
        <end>{end}</end>
      </timeInterval>
      <resolution>{resolution}</resolution>{points}
    </Period>
  </TimeSeries>",
            mrid = self.mrid,
            classification = classification,
            start = self.start,
            end = self.end,
            resolution = self.resolution,
            points = points,
        )
    }
}

pub fn publication(series: &[SeriesXml]) -> String {
    let body: String = series.iter().map(|s| format!("\n  {}", s.render())).collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<Publication_MarketDocument xmlns=\"{ns}\">
  <mRID>doc-1</mRID>
  <revisionNumber>1</revisionNumber>
  <type>A44</type>
  <period.timeInterval>
    <start>2024-01-14T23:00Z</start>
    <end>2024-01-16T23:00Z</end>
  </period.timeInterval>{body}
</Publication_MarketDocument>
",
        ns = PUBLICATION_NAMESPACE,
        body = body,
    )
}

pub fn acknowledgement() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<Acknowledgement_MarketDocument xmlns=\"urn:iec62325.351:tc57wg16:451-1:acknowledgementdocument:7:0\">
  <mRID>ack-1</mRID>
  <Reason>
    <code>999</code>
    <text>No matching data found for Data item Day-ahead Prices [12.1.D]</text>
  </Reason>
</Acknowledgement_MarketDocument>
"
    .to_string()
}
