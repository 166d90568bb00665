use std::env;

use anyhow::{Context, Result};

use crate::fastbill::DEFAULT_API_URL;

/// 環境変数から読み込む実行時の設定。
#[derive(Clone, Debug)]
pub struct Config {
    /// FastBill APIのエンドポイント。
    pub api_url: String,
    /// FastBill APIのユーザー名。
    pub api_user: String,
    /// FastBill APIのAPIキー。
    pub api_key: String,
    /// ファイル名とタイトルに使うローカルのユーザー名。
    pub username: String,
}

impl Config {
    /// 環境変数から設定を読み込む。
    ///
    /// `API_USER`と`API_KEY`が設定されていない場合はエラーを返す。
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 指定された関数で値を引いて設定を組み立てる。
    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_user = lookup("API_USER").context("API_USER must be set")?;
        let api_key = lookup("API_KEY").context("API_KEY must be set")?;
        let username = lookup("USERNAME").unwrap_or_default();
        let api_url = lookup("FASTBILL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            api_url,
            api_user,
            api_key,
            username,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::Config;
    use crate::fastbill::DEFAULT_API_URL;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("API_USER", "me@example.com"), ("API_KEY", "secret")]))
                .unwrap();

        assert_eq!(config.api_user, "me@example.com");
        assert_eq!(config.api_key, "secret");
        assert_eq!(config.username, "");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("API_USER", "me@example.com"),
            ("API_KEY", "secret"),
            ("USERNAME", "jdoe"),
            ("FASTBILL_API_URL", "http://localhost:1234/api.php"),
        ]))
        .unwrap();

        assert_eq!(config.username, "jdoe");
        assert_eq!(config.api_url, "http://localhost:1234/api.php");
    }

    /// 認証情報が欠けている場合は、欠けている変数名を含むエラーを返す。
    #[rstest]
    #[case::no_user(&[("API_KEY", "secret")], "API_USER must be set")]
    #[case::no_key(&[("API_USER", "me@example.com")], "API_KEY must be set")]
    fn test_from_lookup_missing_credentials(
        #[case] vars: &[(&str, &str)],
        #[case] expected: &str,
    ) {
        let error = Config::from_lookup(lookup_from(vars)).unwrap_err();

        assert_eq!(error.to_string(), expected);
    }
}
