//! Line grammar for agency requests and server replies.
//!
//! One request per line, header and body split on the first space only:
//!
//! - `bet <entry>&<entry>&...` — six space-separated fields per entry,
//!   spaces inside names escaped as hyphens on the wire
//! - `betdraw <agencyId>`
//! - `betdrawresults <agencyId>`
//! - `shutdown` — explicit session end

use chrono::NaiveDate;

use crate::bet::Bet;

const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";
const ENTRY_FIELDS: usize = 6;

/// Which request carried a malformed agency id; selects the failure reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRequest {
    Draw,
    Results,
}

impl IdRequest {
    pub fn header(&self) -> &'static str {
        match self {
            Self::Draw => "betdraw",
            Self::Results => "betdrawresults",
        }
    }

    pub fn fail_reply(&self) -> Reply {
        match self {
            Self::Draw => Reply::DrawFail,
            Self::Results => Reply::ResultsFail,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Unrecognized header. Logged, no reply, session continues.
    #[error("unknown header: {0:?}")]
    UnknownHeader(String),

    /// A known header arrived with nothing after it.
    #[error("{0:?} request has no payload")]
    MissingPayload(&'static str),

    /// Some entry in a bet batch failed to parse. Carries the number of
    /// entries attempted, not the failing entry's field count.
    #[error("invalid bet batch of {entries} entries")]
    BadBatch { entries: usize },

    /// Agency id in a draw/results request is not an integer.
    #[error("agency id is not an integer in {} request", .request.header())]
    BadAgencyId { request: IdRequest },
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    SubmitBets(Vec<Bet>),
    ConfirmDraw(u32),
    RequestResults(u32),
    EndSession,
}

impl Request {
    pub fn decode(line: &str) -> Result<Request, DecodeError> {
        let (header, body) = match line.split_once(' ') {
            Some((header, body)) => (header, Some(body)),
            None => (line, None),
        };

        match header {
            "bet" => {
                let body = body.ok_or(DecodeError::MissingPayload("bet"))?;
                Ok(Request::SubmitBets(decode_batch(body)?))
            }
            "betdraw" => {
                let body = body.ok_or(DecodeError::MissingPayload("betdraw"))?;
                Ok(Request::ConfirmDraw(decode_agency_id(body, IdRequest::Draw)?))
            }
            "betdrawresults" => {
                let body = body.ok_or(DecodeError::MissingPayload("betdrawresults"))?;
                Ok(Request::RequestResults(decode_agency_id(
                    body,
                    IdRequest::Results,
                )?))
            }
            "shutdown" => Ok(Request::EndSession),
            other => Err(DecodeError::UnknownHeader(other.to_string())),
        }
    }
}

fn decode_batch(body: &str) -> Result<Vec<Bet>, DecodeError> {
    let raw: Vec<&str> = body.split('&').collect();

    raw.iter()
        .map(|entry| decode_entry(entry))
        .collect::<Option<Vec<Bet>>>()
        .ok_or(DecodeError::BadBatch { entries: raw.len() })
}

fn decode_entry(entry: &str) -> Option<Bet> {
    let fields: Vec<&str> = entry.split(' ').collect();
    if fields.len() != ENTRY_FIELDS {
        return None;
    }

    Some(Bet {
        agency: fields[0].parse().ok()?,
        first_name: unescape_name(fields[1]),
        last_name: unescape_name(fields[2]),
        document: fields[3].to_string(),
        birthdate: NaiveDate::parse_from_str(fields[4], BIRTHDATE_FORMAT).ok()?,
        number: fields[5].parse().ok()?,
    })
}

// Names travel with embedded spaces escaped as hyphens so each entry
// stays exactly six space-separated fields.
fn unescape_name(name: &str) -> String {
    name.replace('-', " ")
}

fn decode_agency_id(body: &str, request: IdRequest) -> Result<u32, DecodeError> {
    body.parse()
        .map_err(|_| DecodeError::BadAgencyId { request })
}

/// A server reply, encoded to one line of wire text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    BetOk,
    BetFail,
    DrawOk,
    DrawFail,
    /// Documents of the requesting agency's winning bets, draw order.
    ResultsOk(Vec<String>),
    ResultsFail,
    SessionEnd,
}

impl Reply {
    pub fn encode(&self) -> String {
        match self {
            Reply::BetOk => "bet success".to_string(),
            Reply::BetFail => "bet fail".to_string(),
            Reply::DrawOk => "betdraw success".to_string(),
            Reply::DrawFail => "betdraw fail".to_string(),
            Reply::ResultsOk(documents) => {
                format!("betdrawresults success {}", documents.join("&"))
            }
            Reply::ResultsFail => "betdrawresults fail".to_string(),
            Reply::SessionEnd => "shutdown success".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_entry_batch_with_escaped_names() {
        let line = "bet 1 Juan Perez 30000001 1990-01-01 100&1 Maria Lopez-Diaz 30000002 1991-02-02 200";

        let request = Request::decode(line).unwrap();
        let Request::SubmitBets(bets) = request else {
            panic!("expected SubmitBets, got {request:?}");
        };

        assert_eq!(bets.len(), 2);
        assert_eq!(bets[0].first_name, "Juan");
        assert_eq!(bets[0].number, 100);
        assert_eq!(bets[1].last_name, "Lopez Diaz");
        assert_eq!(bets[1].number, 200);
        assert_eq!(
            bets[1].birthdate,
            NaiveDate::from_ymd_opt(1991, 2, 2).unwrap()
        );
    }

    #[test]
    fn five_field_entry_fails_batch_with_total_entry_count() {
        let line = "bet 1 Juan Perez 30000001 1990-01-01 100&1 Maria 30000002 1991-02-02 200&1 Luis Gomez 30000003 1992-03-03 300";

        let err = Request::decode(line).unwrap_err();
        assert!(matches!(err, DecodeError::BadBatch { entries: 3 }));
    }

    #[test]
    fn unparseable_number_or_date_fails_batch_the_same_way() {
        let bad_number = "bet 1 Juan Perez 30000001 1990-01-01 ten";
        assert!(matches!(
            Request::decode(bad_number).unwrap_err(),
            DecodeError::BadBatch { entries: 1 }
        ));

        let bad_date = "bet 1 Juan Perez 30000001 someday 100";
        assert!(matches!(
            Request::decode(bad_date).unwrap_err(),
            DecodeError::BadBatch { entries: 1 }
        ));
    }

    #[test]
    fn decodes_draw_and_results_requests() {
        assert_eq!(
            Request::decode("betdraw 3").unwrap(),
            Request::ConfirmDraw(3)
        );
        assert_eq!(
            Request::decode("betdrawresults 7").unwrap(),
            Request::RequestResults(7)
        );
    }

    #[test]
    fn non_integer_agency_id_names_the_request_kind() {
        let err = Request::decode("betdraw agency-one").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BadAgencyId {
                request: IdRequest::Draw
            }
        ));

        let err = Request::decode("betdrawresults x").unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BadAgencyId {
                request: IdRequest::Results
            }
        ));
    }

    #[test]
    fn bare_shutdown_ends_the_session() {
        assert_eq!(Request::decode("shutdown").unwrap(), Request::EndSession);
    }

    #[test]
    fn unknown_header_and_missing_payload_are_header_errors() {
        assert!(matches!(
            Request::decode("ping 1").unwrap_err(),
            DecodeError::UnknownHeader(_)
        ));
        assert!(matches!(
            Request::decode("betdraw").unwrap_err(),
            DecodeError::MissingPayload("betdraw")
        ));
        assert!(matches!(
            Request::decode("bet").unwrap_err(),
            DecodeError::MissingPayload("bet")
        ));
    }

    #[test]
    fn replies_encode_to_exact_wire_text() {
        insta::assert_snapshot!(Reply::BetOk.encode(), @"bet success");
        insta::assert_snapshot!(Reply::BetFail.encode(), @"bet fail");
        insta::assert_snapshot!(Reply::DrawOk.encode(), @"betdraw success");
        insta::assert_snapshot!(Reply::DrawFail.encode(), @"betdraw fail");
        insta::assert_snapshot!(Reply::ResultsFail.encode(), @"betdrawresults fail");
        insta::assert_snapshot!(Reply::SessionEnd.encode(), @"shutdown success");
    }

    #[test]
    fn results_reply_joins_documents_with_ampersands() {
        let reply = Reply::ResultsOk(vec!["30000001".to_string(), "30000002".to_string()]);
        assert_eq!(reply.encode(), "betdrawresults success 30000001&30000002");
    }

    #[test]
    fn empty_results_reply_keeps_the_trailing_space() {
        // Clients split on the space after "success" to detect an empty
        // winners list.
        assert_eq!(
            Reply::ResultsOk(Vec::new()).encode(),
            "betdrawresults success "
        );
    }

    #[test]
    fn fail_reply_matches_request_kind() {
        assert_eq!(IdRequest::Draw.fail_reply(), Reply::DrawFail);
        assert_eq!(IdRequest::Results.fail_reply(), Reply::ResultsFail);
    }
}
