use std::collections::BTreeMap;
use std::io::BufRead;

use lazy_static::lazy_static;
use log::Level;
use regex::Regex;

use crate::domain::node::ActiveNodes;
use crate::domain::reservation::reconciler::Reconciler;
use crate::domain::reservation::reservation::Reservation;
use crate::domain::utils::emitter::DiagnosticEmitter;
use crate::domain::utils::id::{QueueName, ReservationName};
use crate::error::{Error, Result};

// `diagnose -r` describes every reservation (job reservations and standing ones) on
// several lines. The first line has the reservation id in column 0 and ends with the
// node, task and proc counts. The attribute lines that follow are indented.
lazy_static! {
    static ref RES_START_PATTERN: Regex = Regex::new(r"^(?P<resid>[\w.\-]+).*\d+\s+\d+\s+\d+$").unwrap();
    static ref FLAGS_PATTERN: Regex = Regex::new(r"^\s+Flags:\s*STANDINGR(?:ES|SV)").unwrap();
    static ref ACL_PATTERN: Regex = Regex::new(r"^\s+ACL:.*CLASS==(?P<classes>[\w\-+.:=]+)").unwrap();
    static ref CLASS_PATTERN: Regex = Regex::new(r"[\w\-.]+").unwrap();
    static ref CL_PATTERN: Regex = Regex::new(r"^\s+CL:\s+(?:RES|RSV)==").unwrap();
    static ref RESOURCES_PATTERN: Regex = Regex::new(r"^\s+Task Resources:\s*PROCS:\s*(?P<nbprocs>\d+)").unwrap();
    static ref ATTRIBUTES_PATTERN: Regex = Regex::new(r"^\s+Attributes\s+\(Host(?:List|Exp)='(?P<hostlist>.+)'").unwrap();
    static ref WARNING_PATTERN: Regex =
        Regex::new(r"^WARNING:\s+reservation\s+'(?P<resid>[^']*)'.*\b(?P<total>\d+)\s+proc.*allocated.*\b(?P<free>\d+)\s+detected$").unwrap();
}

/// Finalized reservations by id.
pub type ReservationMap = BTreeMap<ReservationName, Reservation>;

/// Where the parser stands in the description of a reservation.
///
/// The attribute lines must appear in the order of the `Awaiting*` variants. The record
/// under construction travels inside the variant and only reaches the reservation map
/// once the attributes line has been matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    AwaitingFlags(Reservation),
    AwaitingAcl(Reservation),
    AwaitingCl(Reservation),
    AwaitingResources(Reservation),
    AwaitingAttributes(Reservation),
    /// The named reservation is complete. Trailing WARNING lines may still update it.
    PostComplete(ReservationName),
}

impl ParserState {
    /// The record under construction, if any.
    pub fn in_progress(&self) -> Option<&Reservation> {
        match self {
            ParserState::AwaitingFlags(reservation)
            | ParserState::AwaitingAcl(reservation)
            | ParserState::AwaitingCl(reservation)
            | ParserState::AwaitingResources(reservation)
            | ParserState::AwaitingAttributes(reservation) => Some(reservation),
            ParserState::Idle | ParserState::PostComplete(_) => None,
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            ParserState::AwaitingFlags(_) => "flags",
            ParserState::AwaitingAcl(_) => "acl",
            ParserState::AwaitingCl(_) => "cl",
            ParserState::AwaitingResources(_) => "resources",
            ParserState::AwaitingAttributes(_) => "attributes",
            ParserState::Idle | ParserState::PostComplete(_) => "reservation start",
        }
    }

    /// The effect of dropping the record under construction, if any.
    fn abandon(&self) -> Option<Effect> {
        match self {
            ParserState::AwaitingFlags(reservation) => Some(Effect::Skip(reservation.name.clone())),
            other => other.in_progress().map(|reservation| Effect::Discard(reservation.name.clone())),
        }
    }
}

/// Change to the reservation map requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// All five attribute lines matched.
    Finalize(Reservation),
    /// The description deviated from the expected sequence.
    Discard(ReservationName),
    /// The description has no standing reservation flag (job and user reservations).
    Skip(ReservationName),
    /// A WARNING line reported the usage of the reservation just finalized.
    UsedSlots { name: ReservationName, used: i64, total: i64 },
}

/// Reservation Record Parser for `diagnose -r` output.
///
/// The parser is strict on purpose: a description missing any expected line is dropped
/// rather than guessed at, so a change in the diagnose output format shows up as missing
/// reservations instead of wrong slot counts.
pub struct ReservationParser<'a> {
    reconciler: Reconciler<'a>,
    emitter: &'a dyn DiagnosticEmitter,
}

impl<'a> ReservationParser<'a> {
    pub fn new(active_nodes: &'a ActiveNodes, emitter: &'a dyn DiagnosticEmitter) -> Self {
        ReservationParser { reconciler: Reconciler::new(active_nodes, emitter), emitter }
    }

    /// Parses a whole stream. A read error aborts the parse and no reservation is returned.
    pub fn parse<R: BufRead>(&self, reader: R) -> Result<ReservationMap> {
        let mut reservations = ReservationMap::new();
        let mut state = ParserState::Idle;

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::DiagnosticStreamError(format!("line {}: {}", index + 1, e)))?;
            let (next_state, effect) = self.transition(state, &line, index + 1);
            state = next_state;
            if let Some(effect) = effect {
                self.apply(&mut reservations, effect);
            }
        }

        if let Some(effect) = self.finish(state) {
            self.apply(&mut reservations, effect);
        }

        self.report(&reservations);
        Ok(reservations)
    }

    /// Consumes one line. A reservation start line is checked before anything else: it
    /// ends the current description, complete or not, and opens a new one.
    pub fn transition(&self, state: ParserState, line: &str, line_number: usize) -> (ParserState, Option<Effect>) {
        // The start and warning lines are anchored at their end, trailing blanks must not defeat that.
        let line = line.trim_end();

        if let Some(captures) = RES_START_PATTERN.captures(line) {
            let name = ReservationName::new(&captures["resid"]);
            self.emitter.emit(Level::Debug, &format!("Line {}: start of reservation '{}' description", line_number, name));

            let effect = state.abandon();
            return (ParserState::AwaitingFlags(Reservation::new(name)), effect);
        }

        match state {
            ParserState::Idle => {
                self.emitter.emit(Level::Trace, &format!("Line {} ignored: >>>{}<<<", line_number, line));
                (ParserState::Idle, None)
            }
            ParserState::PostComplete(name) => {
                let effect = self.match_warning(&name, line, line_number);
                (ParserState::PostComplete(name), effect)
            }
            in_progress => self.advance(in_progress, line, line_number),
        }
    }

    /// Flushes the state at end of stream. A description cut short never reaches the map.
    pub fn finish(&self, state: ParserState) -> Option<Effect> {
        state.abandon()
    }

    fn advance(&self, state: ParserState, line: &str, line_number: usize) -> (ParserState, Option<Effect>) {
        self.emitter.emit(Level::Debug, &format!("Line {}: looking for line matching state {}", line_number, state.expected()));

        let next = match state {
            ParserState::AwaitingFlags(reservation) => {
                if FLAGS_PATTERN.is_match(line) {
                    Ok(ParserState::AwaitingAcl(reservation))
                } else {
                    Err(Effect::Skip(reservation.name))
                }
            }
            ParserState::AwaitingAcl(mut reservation) => match ACL_PATTERN.captures(line) {
                Some(captures) => {
                    let classes = &captures["classes"];
                    self.emitter.emit(Level::Trace, &format!("queues=>>>{}<<<", classes));
                    reservation.queues = CLASS_PATTERN.find_iter(classes).map(|class| QueueName::new(class.as_str())).collect();
                    Ok(ParserState::AwaitingCl(reservation))
                }
                None => Err(Effect::Discard(reservation.name)),
            },
            ParserState::AwaitingCl(reservation) => {
                if CL_PATTERN.is_match(line) {
                    Ok(ParserState::AwaitingResources(reservation))
                } else {
                    Err(Effect::Discard(reservation.name))
                }
            }
            ParserState::AwaitingResources(mut reservation) => {
                match RESOURCES_PATTERN.captures(line).and_then(|captures| captures["nbprocs"].parse::<i64>().ok()) {
                    Some(nbprocs) => {
                        reservation.nbprocs = nbprocs;
                        Ok(ParserState::AwaitingAttributes(reservation))
                    }
                    None => Err(Effect::Discard(reservation.name)),
                }
            }
            ParserState::AwaitingAttributes(mut reservation) => match ATTRIBUTES_PATTERN.captures(line) {
                Some(captures) => {
                    let hostlist = &captures["hostlist"];
                    self.emitter.emit(Level::Trace, &format!("Hostlist=>>>{}<<<", hostlist));
                    self.reconciler.apply(&mut reservation, hostlist.split(','));

                    let name = reservation.name.clone();
                    return (ParserState::PostComplete(name), Some(Effect::Finalize(reservation)));
                }
                None => Err(Effect::Discard(reservation.name)),
            },
            other => return (other, None),
        };

        match next {
            Ok(next_state) => {
                self.emitter.emit(Level::Trace, &format!("Line {}: match found, next state {}", line_number, next_state.expected()));
                (next_state, None)
            }
            Err(abort) => (ParserState::Idle, Some(abort)),
        }
    }

    fn match_warning(&self, current: &ReservationName, line: &str, line_number: usize) -> Option<Effect> {
        let captures = WARNING_PATTERN.captures(line)?;
        let resid = &captures["resid"];

        if resid != current.as_str() {
            self.emitter.emit(
                Level::Info,
                &format!("WARNING line found ({}) but for a reservation ({}) different from current one ({})", line_number, resid, current),
            );
            return None;
        }

        match (captures["total"].parse::<i64>(), captures["free"].parse::<i64>()) {
            (Ok(total), Ok(free)) => Some(Effect::UsedSlots { name: current.clone(), used: total - free, total }),
            _ => {
                self.emitter.emit(Level::Info, &format!("WARNING line found ({}) with unreadable slot counts: {}", line_number, line));
                None
            }
        }
    }

    fn apply(&self, reservations: &mut ReservationMap, effect: Effect) {
        match effect {
            Effect::Finalize(reservation) => {
                self.emitter.emit(Level::Debug, &format!("Reservation {} complete", reservation.name));
                reservations.insert(reservation.name.clone(), reservation);
            }
            Effect::Discard(name) => {
                reservations.remove(&name);
                self.emitter.emit(Level::Info, &format!("Reservation {} incomplete and discarded", name));
            }
            Effect::Skip(name) => {
                reservations.remove(&name);
                self.emitter.emit(Level::Debug, &format!("Reservation {} is not a standing reservation, skipped", name));
            }
            Effect::UsedSlots { name, used, total } => {
                if let Some(reservation) = reservations.get_mut(&name) {
                    reservation.used_slots = used;
                    self.emitter.emit(Level::Info, &format!("Reservation {}: {} slots used over a total of {} slots", name, used, total));
                }
            }
        }
    }

    fn report(&self, reservations: &ReservationMap) {
        if reservations.is_empty() {
            self.emitter.emit(Level::Info, "No SR information collected");
            return;
        }

        self.emitter.emit(Level::Info, &format!("Information collected about {} SRs", reservations.len()));
        for reservation in reservations.values() {
            self.emitter.emit(Level::Trace, &format!("SR {}: {:?}", reservation.name, reservation));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::Node;
    use crate::domain::utils::emitter::RecordingEmitter;
    use crate::domain::utils::id::NodeName;
    use indoc::indoc;
    use std::io::{self, Read};

    const SR1: &str = indoc! {"
        SR1                        User DEF   -00:01:00   INFINITY    INFINITY    3    6    6
            Flags: STANDINGRSV IGNSTATE
            ACL:   RSV==SR1= CLASS==batch:short
            CL:    RSV==SR1
            Task Resources: PROCS: 10
            Attributes (HostList='n1,n2,n3')
            Active PH: 0.00/4.00    (0.00%)
    "};

    fn active_nodes() -> ActiveNodes {
        let nodes = vec![
            Node::new(NodeName::new("n1"), vec![], 4, None),
            Node::new(NodeName::new("n2"), vec!["offline".to_string()], 8, Some(vec!["j1".to_string(), "j2".to_string()])),
            Node::new(NodeName::new("n3"), vec!["down".to_string()], 4, None),
        ];
        ActiveNodes::from_nodes(&nodes)
    }

    fn parse(text: &str) -> (ReservationMap, RecordingEmitter) {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let reservations = ReservationParser::new(&active, &emitter).parse(text.as_bytes()).unwrap();
        (reservations, emitter)
    }

    #[test]
    fn test_complete_record() {
        let (reservations, emitter) = parse(SR1);

        let sr1 = &reservations["SR1"];
        assert_eq!(sr1.queues.iter().map(|queue| queue.as_str()).collect::<Vec<_>>(), vec!["batch", "short"]);
        assert_eq!(sr1.hostlist, vec![NodeName::new("n1"), NodeName::new("n2")]);
        assert_eq!(sr1.nbprocs, 6);
        assert_eq!(sr1.used_slots, 0);
        assert!(emitter.contains("Reservation SR1: inactive node n3 removed"));
    }

    #[test]
    fn test_warning_sets_used_slots() {
        let text = format!("{}WARNING:  reservation 'SR1' has 6 procs allocated but 2 detected\n", SR1);
        let (reservations, _) = parse(&text);

        assert_eq!(reservations["SR1"].used_slots, 4);
    }

    #[test]
    fn test_warning_with_multi_digit_counts() {
        let text = format!("{}WARNING:  reservation 'SR1' has 16 procs allocated but 12 detected\n", SR1);
        let (reservations, _) = parse(&text);

        assert_eq!(reservations["SR1"].used_slots, 4);
    }

    #[test]
    fn test_warning_for_other_reservation_is_ignored() {
        let text = format!("{}WARNING:  reservation 'SR9' has 6 procs allocated but 2 detected\n", SR1);
        let (reservations, emitter) = parse(&text);

        assert_eq!(reservations["SR1"].used_slots, 0);
        assert!(emitter.contains("different from current one (SR1)"));
    }

    #[test]
    fn test_missing_cl_line_discards_record() {
        let text = indoc! {"
            SR2                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                Flags: STANDINGRES
                ACL:   RSV==SR2= CLASS==batch
                Task Resources: PROCS: 4
                Attributes (HostList='n1')
        "};
        let (reservations, emitter) = parse(text);

        assert!(reservations.is_empty());
        assert!(emitter.contains("Reservation SR2 incomplete and discarded"));
        assert!(emitter.contains("No SR information collected"));
    }

    #[test]
    fn test_stream_ending_before_attributes_discards_record() {
        let text = indoc! {"
            SR3                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                Flags: STANDINGRSV
                ACL:   CLASS==batch
                CL:    RES==SR3
                Task Resources: PROCS: 4
        "};
        let (reservations, _) = parse(text);

        assert!(!reservations.contains_key("SR3"));
    }

    #[test]
    fn test_job_reservation_is_skipped() {
        let text = format!(
            "{}{}",
            indoc! {"
                12345                       Job R    -00:10:00    00:50:00     1:00:00    1    1    1
                    Flags: ISACTIVE
                    ACL:   RSV==12345= JOB==12345=
            "},
            SR1
        );
        let (reservations, emitter) = parse(&text);

        assert_eq!(reservations.len(), 1);
        assert!(reservations.contains_key("SR1"));
        assert!(!emitter.contains("Reservation 12345 incomplete"));
        let skipped: Vec<Level> =
            emitter.messages().into_iter().filter(|(_, message)| message.contains("Reservation 12345")).map(|(level, _)| level).collect();
        assert_eq!(skipped, vec![Level::Debug]);
    }

    #[test]
    fn test_collected_count_is_reported() {
        let (_, emitter) = parse(SR1);

        assert!(emitter.messages().contains(&(Level::Info, "Information collected about 1 SRs".to_string())));
    }

    #[test]
    fn test_trailing_blanks_do_not_hide_records() {
        let text = "SR8                        User DEF   -00:01:00   INFINITY    INFINITY    1  4  4  \n\
                    \x20   Flags: STANDINGRSV\n\
                    \x20   ACL:   CLASS==batch\n\
                    \x20   CL:    RSV==SR8\n\
                    \x20   Task Resources: PROCS: 2\n\
                    \x20   Attributes (HostList='n1')\n\
                    WARNING:  reservation 'SR8' has 2 procs allocated but 1 detected \t\n";
        let (reservations, _) = parse(text);

        assert_eq!(reservations["SR8"].nbprocs, 2);
        assert_eq!(reservations["SR8"].used_slots, 1);
    }

    #[test]
    fn test_start_line_interrupts_incomplete_record() {
        let text = format!(
            "{}{}",
            indoc! {"
                SR4                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                    Flags: STANDINGRSV
                    ACL:   CLASS==batch
            "},
            SR1
        );
        let (reservations, emitter) = parse(&text);

        assert!(!reservations.contains_key("SR4"));
        assert!(reservations.contains_key("SR1"));
        assert!(emitter.contains("Reservation SR4 incomplete and discarded"));
    }

    #[test]
    fn test_warning_after_next_start_does_not_update_previous() {
        let text = format!(
            "{}{}",
            SR1,
            indoc! {"
                SR5                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                WARNING:  reservation 'SR1' has 6 procs allocated but 2 detected
            "}
        );
        let (reservations, _) = parse(&text);

        assert_eq!(reservations["SR1"].used_slots, 0);
        assert!(!reservations.contains_key("SR5"));
    }

    #[test]
    fn test_host_expression_variant() {
        let text = indoc! {"
            SR6                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                Flags: STANDINGRSV
                ACL:   CLASS==long
                CL:    RES==SR6
                Task Resources: PROCS: 2
                Attributes (HostExp='n1')
        "};
        let (reservations, _) = parse(text);

        let sr6 = &reservations["SR6"];
        assert_eq!(sr6.hostlist, vec![NodeName::new("n1")]);
        assert_eq!(sr6.nbprocs, 2);
    }

    #[test]
    fn test_duplicate_classes_collapse() {
        let text = indoc! {"
            SR7                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                Flags: STANDINGRSV
                ACL:   CLASS==batch:batch:sdj-queue
                CL:    RSV==SR7
                Task Resources: PROCS: 2
                Attributes (HostList='n1')
        "};
        let (reservations, _) = parse(text);

        let queues: Vec<&str> = reservations["SR7"].queues.iter().map(|queue| queue.as_str()).collect();
        assert_eq!(queues, vec!["batch", "sdj-queue"]);
    }

    #[test]
    fn test_transition_is_explicit() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let parser = ReservationParser::new(&active, &emitter);

        let (state, effect) = parser.transition(ParserState::Idle, "SR1  User DEF  1  2  2", 1);
        assert!(matches!(state, ParserState::AwaitingFlags(_)));
        assert!(effect.is_none());

        let (state, effect) = parser.transition(state, "    Flags: STANDINGRSV", 2);
        assert!(matches!(state, ParserState::AwaitingAcl(_)));
        assert!(effect.is_none());

        let (state, effect) = parser.transition(state, "    garbage", 3);
        assert_eq!(state, ParserState::Idle);
        assert_eq!(effect, Some(Effect::Discard(ReservationName::new("SR1"))));

        let (state, _) = parser.transition(state, "12345  Job R  1  1  1", 4);
        let (state, effect) = parser.transition(state, "    Flags: ISACTIVE", 5);
        assert_eq!(state, ParserState::Idle);
        assert_eq!(effect, Some(Effect::Skip(ReservationName::new("12345"))));
    }

    #[test]
    fn test_discard_removes_earlier_record_with_same_id() {
        let text = format!(
            "{}{}",
            SR1,
            indoc! {"
                SR1                        User DEF   -00:01:00   INFINITY    INFINITY    1    4    4
                    Flags: STANDINGRSV
                    bogus line
            "}
        );
        let (reservations, _) = parse(&text);

        assert!(!reservations.contains_key("SR1"));
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "diagnose died"))
        }
    }

    #[test]
    fn test_unreadable_stream_is_fatal() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let result = ReservationParser::new(&active, &emitter).parse(io::BufReader::new(FailingReader));

        assert!(matches!(result, Err(Error::DiagnosticStreamError(_))));
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let active = active_nodes();
        let emitter = RecordingEmitter::new();
        let bytes: &[u8] = b"SR1  User DEF  1  2  2\n    Flags: \xff\xfe\n";
        let result = ReservationParser::new(&active, &emitter).parse(bytes);

        assert!(matches!(result, Err(Error::DiagnosticStreamError(_))));
    }
}
