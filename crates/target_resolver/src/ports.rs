//! Port specification parsing

use portprobe_common::ParseError;

/// Parse a port string like "80,443,8000-8002" into ports, in input order.
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, ParseError> {
    if spec.trim().is_empty() {
        return Err(ParseError::EmptyResult("ports"));
    }

    let mut ports = Vec::new();
    for segment in spec.split(',').map(str::trim) {
        match segment.split_once('-') {
            None => ports.push(parse_port(segment)?),
            Some((start, end)) if !end.contains('-') => {
                let start = parse_port(start).map_err(|_| ParseError::InvalidPort(segment.to_string()))?;
                let end = parse_port(end).map_err(|_| ParseError::InvalidPort(segment.to_string()))?;
                if end < start {
                    return Err(ParseError::range(
                        segment,
                        format!("end {} is before start {}", end, start),
                    ));
                }
                ports.extend(start..=end);
            }
            Some(_) => return Err(ParseError::InvalidFormat(segment.to_string())),
        }
    }

    if ports.is_empty() {
        return Err(ParseError::EmptyResult("ports"));
    }
    Ok(ports)
}

/// Strict decimal parse: no sign, no blanks, must fit in 16 bits.
fn parse_port(s: &str) -> Result<u16, ParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPort(s.to_string()));
    }
    s.parse::<u16>()
        .map_err(|_| ParseError::InvalidPort(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ports_single() {
        assert_eq!(parse_ports("10000").unwrap(), vec![10000]);
    }

    #[test]
    fn test_parse_ports_range() {
        assert_eq!(
            parse_ports("10000-10005").unwrap(),
            vec![10000, 10001, 10002, 10003, 10004, 10005]
        );
    }

    #[test]
    fn test_parse_ports_mixed() {
        assert_eq!(
            parse_ports("80,443,8000-8002").unwrap(),
            vec![80, 443, 8000, 8001, 8002]
        );
        assert_eq!(
            parse_ports("80, 443, 8000-8005").unwrap(),
            vec![80, 443, 8000, 8001, 8002, 8003, 8004, 8005]
        );
    }

    #[test]
    fn test_parse_ports_full_range_edges() {
        let ports = parse_ports("0-2,65534-65535").unwrap();
        assert_eq!(ports, vec![0, 1, 2, 65534, 65535]);
        assert_eq!(parse_ports("1-65535").unwrap().len(), 65535);
    }

    #[test]
    fn test_parse_ports_inverted_range() {
        assert!(matches!(
            parse_ports("9999-8888,6666-7777").unwrap_err(),
            ParseError::InvalidRange { .. }
        ));
    }

    #[test]
    fn test_parse_ports_out_of_range() {
        assert_eq!(
            parse_ports("100000").unwrap_err(),
            ParseError::InvalidPort("100000".into())
        );
        assert_eq!(
            parse_ports("80-65536").unwrap_err(),
            ParseError::InvalidPort("80-65536".into())
        );
    }

    #[test]
    fn test_parse_ports_invalid() {
        assert!(matches!(parse_ports("abcefgh,").unwrap_err(), ParseError::InvalidPort(_)));
        assert!(matches!(parse_ports("80-").unwrap_err(), ParseError::InvalidPort(_)));
        assert!(matches!(parse_ports("-80").unwrap_err(), ParseError::InvalidPort(_)));
        assert!(matches!(parse_ports("+80").unwrap_err(), ParseError::InvalidPort(_)));
        assert_eq!(
            parse_ports("1-2-3").unwrap_err(),
            ParseError::InvalidFormat("1-2-3".into())
        );
    }

    #[test]
    fn test_parse_ports_empty() {
        assert_eq!(parse_ports("").unwrap_err(), ParseError::EmptyResult("ports"));
        assert_eq!(parse_ports("  ").unwrap_err(), ParseError::EmptyResult("ports"));
    }
}
