// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// An error carrying a stable, greppable code such as `[F-EXE-001]`.
pub trait CodedError: std::error::Error {
    fn code(&self) -> &str;
}

/// Implements `Debug` for a [CodedError] as its display message. Display
/// messages start with the code, so `{err:?}` stays greppable.
#[macro_export]
macro_rules! impl_coded_debug {
    ($name:ident) => {
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{self}")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use thiserror::Error;

    #[derive(Error)]
    enum SampleErr {
        #[error("{code} sample failure", code = self.code())]
        Sample,
    }

    impl_coded_debug!(SampleErr);

    impl CodedError for SampleErr {
        fn code(&self) -> &str {
            match self {
                SampleErr::Sample => "[F-TEST-001]",
            }
        }
    }

    #[test]
    fn coded_debug_prefixes_code() {
        assert_eq!(format!("{:?}", SampleErr::Sample), "[F-TEST-001] sample failure");
    }
}
