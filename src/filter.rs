use crate::attribute::Scalar;
use crate::error::{Error, Result};


/// Expands a filter template such as `(uid={0})`, substituting each `{n}` with
/// the RFC 4515-escaped `n`th argument.
pub fn expand(template: &str, args: &[Scalar]) -> Result<String> {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        expanded.push_str(&rest[..open]);
        let after_open = &rest[open+1..];
        let Some(close) = after_open.find('}') else {
            return Err(Error::invalid(format!(
                "unterminated placeholder in filter {:?}", template,
            )));
        };
        let index_str = &after_open[..close];
        let index: usize = index_str.trim().parse()
            .map_err(|_| Error::invalid(format!(
                "placeholder {{{}}} in filter {:?} is not an argument index", index_str, template,
            )))?;
        let arg = args.get(index)
            .ok_or_else(|| Error::invalid(format!(
                "filter {:?} refers to argument {} but only {} were given", template, index, args.len(),
            )))?;
        escape_into(&mut expanded, arg);
        rest = &after_open[close+1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

fn escape_into(out: &mut String, arg: &Scalar) {
    match arg {
        Scalar::Text(s) => out.push_str(&ldap3::ldap_escape(s.as_str())),
        Scalar::Binary(bytes) => {
            for b in bytes {
                out.push_str(&format!("\\{:02x}", b));
            }
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_without_placeholders() {
        assert_eq!(expand("(objectClass=*)", &[]).unwrap(), "(objectClass=*)");
    }

    #[test]
    fn test_expand_escapes_arguments() {
        let args = [Scalar::from("j*doe (admin)"), Scalar::from("x")];
        assert_eq!(
            expand("(&(cn={0})(sn={1}))", &args).unwrap().to_ascii_lowercase(),
            "(&(cn=j\\2adoe \\28admin\\29)(sn=x))",
        );
    }

    #[test]
    fn test_expand_binary_argument() {
        let args = [Scalar::Binary(vec![0x01, 0xAB])];
        assert_eq!(expand("(objectGUID={0})", &args).unwrap(), "(objectGUID=\\01\\ab)");
    }

    #[test]
    fn test_expand_reuses_argument() {
        let args = [Scalar::from("a")];
        assert_eq!(expand("(|(cn={0})(sn={0}))", &args).unwrap(), "(|(cn=a)(sn=a))");
    }

    #[test]
    fn test_expand_rejects_bad_placeholders() {
        assert!(matches!(expand("(cn={1})", &[Scalar::from("a")]), Err(Error::InvalidArgument(_))));
        assert!(matches!(expand("(cn={x})", &[]), Err(Error::InvalidArgument(_))));
        assert!(matches!(expand("(cn={0)", &[]), Err(Error::InvalidArgument(_))));
    }
}
